//! Image overlay configuration.
//!
//! The wire format keeps animation parameters as flat optional fields;
//! [`ImageOverlay::animation`] and [`ImageOverlay::placement`] resolve them
//! into typed values with defaults applied.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::request::{require_path, RequestError};

/// Default fade in/out duration (seconds).
pub const DEFAULT_FADE_DURATION: f64 = 1.0;
/// Default slide-in duration (seconds).
pub const DEFAULT_SLIDE_DURATION: f64 = 1.0;
/// Default zoom start factor.
pub const DEFAULT_ZOOM_FROM: f64 = 1.0;
/// Default zoom end factor.
pub const DEFAULT_ZOOM_TO: f64 = 1.5;

/// Predefined overlay positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
    /// Explicit `x`/`y` pixel coordinates
    Custom,
}

/// Overlay animation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnimationKind {
    #[default]
    None,
    Fade,
    Slide,
    Zoom,
}

/// Edge a sliding overlay enters from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlideDirection {
    #[default]
    Left,
    Right,
    Top,
    Bottom,
}

/// Resolved overlay placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Preset(OverlayPosition),
    Custom { x: i32, y: i32 },
}

/// Resolved overlay animation with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Animation {
    None,
    Fade { duration: f64 },
    Slide { direction: SlideDirection, duration: f64 },
    Zoom { from: f64, to: f64 },
}

/// Image overlay request (wire format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageOverlay {
    /// Path of the image file
    pub file_path: String,
    #[serde(default)]
    pub position: OverlayPosition,
    /// Custom x position (only with `position = custom`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// Custom y position (only with `position = custom`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    /// When the overlay appears (seconds, inclusive)
    #[serde(default)]
    pub start_time: f64,
    /// When the overlay disappears (seconds, exclusive)
    pub end_time: f64,
    #[serde(default)]
    pub animation: AnimationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_direction: Option<SlideDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_from: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_to: Option<f64>,
}

impl ImageOverlay {
    /// Create a static overlay visible during `[start_time, end_time)`.
    pub fn new(file_path: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            file_path: file_path.into(),
            position: OverlayPosition::default(),
            x: None,
            y: None,
            start_time,
            end_time,
            animation: AnimationKind::None,
            fade_duration: None,
            slide_direction: None,
            slide_duration: None,
            zoom_from: None,
            zoom_to: None,
        }
    }

    /// Set a preset position.
    pub fn at(mut self, position: OverlayPosition) -> Self {
        self.position = position;
        self
    }

    /// Set a custom pixel position.
    pub fn at_xy(mut self, x: i32, y: i32) -> Self {
        self.position = OverlayPosition::Custom;
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Fade in and out over `duration` seconds.
    pub fn with_fade(mut self, duration: f64) -> Self {
        self.animation = AnimationKind::Fade;
        self.fade_duration = Some(duration);
        self
    }

    /// Slide in from `direction` over `duration` seconds.
    pub fn with_slide(mut self, direction: SlideDirection, duration: f64) -> Self {
        self.animation = AnimationKind::Slide;
        self.slide_direction = Some(direction);
        self.slide_duration = Some(duration);
        self
    }

    /// Zoom from `from` to `to` across the visibility window.
    pub fn with_zoom(mut self, from: f64, to: f64) -> Self {
        self.animation = AnimationKind::Zoom;
        self.zoom_from = Some(from);
        self.zoom_to = Some(to);
        self
    }

    /// Resolve the placement. `custom` without both coordinates falls back to top-left.
    pub fn placement(&self) -> Placement {
        match (self.position, self.x, self.y) {
            (OverlayPosition::Custom, Some(x), Some(y)) => Placement::Custom { x, y },
            (OverlayPosition::Custom, _, _) => Placement::Preset(OverlayPosition::TopLeft),
            (position, _, _) => Placement::Preset(position),
        }
    }

    /// Resolve the animation with defaults applied.
    pub fn animation(&self) -> Animation {
        match self.animation {
            AnimationKind::None => Animation::None,
            AnimationKind::Fade => Animation::Fade {
                duration: self.fade_duration.unwrap_or(DEFAULT_FADE_DURATION),
            },
            AnimationKind::Slide => Animation::Slide {
                direction: self.slide_direction.unwrap_or_default(),
                duration: self.slide_duration.unwrap_or(DEFAULT_SLIDE_DURATION),
            },
            AnimationKind::Zoom => Animation::Zoom {
                from: self.zoom_from.unwrap_or(DEFAULT_ZOOM_FROM),
                to: self.zoom_to.unwrap_or(DEFAULT_ZOOM_TO),
            },
        }
    }

    pub(crate) fn validate(&self, field: &str) -> Result<(), RequestError> {
        require_path(&self.file_path, &format!("{field}.file_path"))?;

        if self.start_time < 0.0 {
            return Err(RequestError::invalid_value(
                format!("{field}.start_time"),
                "must not be negative",
            ));
        }
        if self.end_time <= self.start_time {
            return Err(RequestError::invalid_value(
                format!("{field}.end_time"),
                "must be greater than start_time",
            ));
        }

        let positive = [
            ("fade_duration", self.fade_duration),
            ("slide_duration", self.slide_duration),
            ("zoom_from", self.zoom_from),
            ("zoom_to", self.zoom_to),
        ];
        for (name, value) in positive {
            if matches!(value, Some(v) if v <= 0.0) {
                return Err(RequestError::invalid_value(
                    format!("{field}.{name}"),
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_resolution() {
        let overlay = ImageOverlay::new("logo.png", 0.0, 5.0).at(OverlayPosition::Center);
        assert_eq!(overlay.placement(), Placement::Preset(OverlayPosition::Center));

        let overlay = ImageOverlay::new("logo.png", 0.0, 5.0).at_xy(40, 60);
        assert_eq!(overlay.placement(), Placement::Custom { x: 40, y: 60 });

        let mut overlay = ImageOverlay::new("logo.png", 0.0, 5.0).at(OverlayPosition::Custom);
        overlay.x = Some(5);
        assert_eq!(overlay.placement(), Placement::Preset(OverlayPosition::TopLeft));
    }

    #[test]
    fn test_animation_defaults() {
        let mut overlay = ImageOverlay::new("logo.png", 0.0, 5.0);
        assert_eq!(overlay.animation(), Animation::None);

        overlay.animation = AnimationKind::Fade;
        assert_eq!(overlay.animation(), Animation::Fade { duration: 1.0 });

        overlay.animation = AnimationKind::Slide;
        assert_eq!(
            overlay.animation(),
            Animation::Slide {
                direction: SlideDirection::Left,
                duration: 1.0
            }
        );

        overlay.animation = AnimationKind::Zoom;
        assert_eq!(overlay.animation(), Animation::Zoom { from: 1.0, to: 1.5 });
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{
            "file_path": "/uploads/logo.png",
            "position": "bottom-right",
            "start_time": 1,
            "end_time": 6,
            "animation": "slide",
            "slide_direction": "top",
            "slide_duration": 0.5
        }"#;
        let overlay: ImageOverlay = serde_json::from_str(json).unwrap();
        assert_eq!(overlay.position, OverlayPosition::BottomRight);
        assert_eq!(
            overlay.animation(),
            Animation::Slide {
                direction: SlideDirection::Top,
                duration: 0.5
            }
        );
    }

    #[test]
    fn test_validate_window() {
        assert!(ImageOverlay::new("logo.png", 0.0, 5.0).validate("overlay").is_ok());
        assert!(ImageOverlay::new("logo.png", 5.0, 5.0).validate("overlay").is_err());
        assert!(ImageOverlay::new("", 0.0, 5.0).validate("overlay").is_err());
        assert!(ImageOverlay::new("logo.png", 0.0, 5.0)
            .with_fade(0.0)
            .validate("overlay")
            .is_err());
    }
}
