//! Image overlay with placement, time window and animation.

use std::path::Path;

use vforge_models::{Animation, EncodingConfig, ImageOverlay, OverlayPosition, Placement, SlideDirection};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::graph::{quoted, secs, Filter, FilterChain, FilterGraph, StreamRef};

use super::require_path;

/// Inset from the frame edge for preset positions (pixels).
const EDGE_INSET: i32 = 10;

/// Build the overlay command: the video is input 0, image `i` is input `i + 1`.
///
/// Overlays are composited in order, each on top of the previous result.
/// Audio is copied when present.
pub fn build_overlay(
    video_path: &str,
    overlays: &[ImageOverlay],
    output: &Path,
    encoding: &EncodingConfig,
) -> MediaResult<FfmpegCommand> {
    require_path(video_path, "video_path")?;

    let mut cmd = FfmpegCommand::new(output).input(video_path);
    let mut graph = FilterGraph::new();
    let mut base = StreamRef::video(0);
    let out_v = StreamRef::label("outv");

    for (i, overlay) in overlays.iter().enumerate() {
        require_path(&overlay.file_path, &format!("overlays[{i}].file_path"))?;
        cmd = if loops_image(overlay) {
            cmd.input_with_args(["-loop", "1"], &overlay.file_path)
        } else {
            cmd.input(&overlay.file_path)
        };

        let image = StreamRef::label(format!("ov{i}"));
        let mut image_chain = FilterChain::new().input(StreamRef::video(i + 1));
        for filter in image_filters(overlay) {
            image_chain = image_chain.filter(filter);
        }
        if image_chain.filters.is_empty() {
            image_chain = image_chain.filter(Filter::new("null"));
        }
        graph.push(image_chain.output(image.clone()));

        let next = if i + 1 == overlays.len() {
            out_v.clone()
        } else {
            StreamRef::label(format!("v{}", i + 1))
        };
        graph.push(
            FilterChain::new()
                .input(base)
                .input(image)
                .filter(overlay_filter(overlay))
                .output(next.clone()),
        );
        base = next;
    }

    Ok(cmd
        .filter_graph(graph)
        .map(&out_v)
        .map_optional(&StreamRef::audio(0))
        .video_codec(&encoding.codec)
        .output_args(["-preset", encoding.preset.as_str()])
        .output_args(["-crf".to_string(), encoding.crf.to_string()])
        .audio_codec("copy"))
}

/// Whether the image input must be a looped stream.
///
/// Fade and zoom animate the image frames themselves, which a single decoded
/// still frame cannot carry past its first timestamp.
fn loops_image(overlay: &ImageOverlay) -> bool {
    matches!(
        overlay.animation(),
        Animation::Fade { .. } | Animation::Zoom { .. }
    )
}

/// Filters applied to the image stream before compositing.
fn image_filters(overlay: &ImageOverlay) -> Vec<Filter> {
    match overlay.animation() {
        Animation::Fade { duration } => vec![
            Filter::new("format").arg("rgba"),
            Filter::new("fade")
                .kv("t", "in")
                .kv("st", secs(overlay.start_time))
                .kv("d", secs(duration))
                .kv("alpha", 1),
            Filter::new("fade")
                .kv("t", "out")
                .kv("st", secs(overlay.end_time - duration))
                .kv("d", secs(duration))
                .kv("alpha", 1),
        ],
        Animation::Zoom { from, to } => {
            let factor = format!(
                "{}+({}-{})*{}",
                secs(from),
                secs(to),
                secs(from),
                progress(overlay.start_time, overlay.end_time - overlay.start_time)
            );
            vec![Filter::new("scale")
                .kv("w", quoted(format!("iw*({factor})")))
                .kv("h", quoted(format!("ih*({factor})")))
                .kv("eval", "frame")]
        }
        Animation::None | Animation::Slide { .. } => Vec::new(),
    }
}

/// The `overlay` filter with position and visibility window.
fn overlay_filter(overlay: &ImageOverlay) -> Filter {
    let (mut x, mut y) = base_position(overlay.placement());
    let mut per_frame = matches!(overlay.animation(), Animation::Zoom { .. });

    if let Animation::Slide { direction, duration } = overlay.animation() {
        let p = progress(overlay.start_time, duration);
        match direction {
            SlideDirection::Left => x = quoted(format!("-overlay_w+{p}*(overlay_w+{x})")),
            SlideDirection::Right => x = quoted(format!("main_w-{p}*(main_w-{x})")),
            SlideDirection::Top => y = quoted(format!("-overlay_h+{p}*(overlay_h+{y})")),
            SlideDirection::Bottom => y = quoted(format!("main_h-{p}*(main_h-{y})")),
        }
        per_frame = true;
    }

    let filter = Filter::new("overlay")
        .kv("x", x)
        .kv("y", y)
        .kv(
            "enable",
            quoted(format!(
                "gte(t,{})*lt(t,{})",
                secs(overlay.start_time),
                secs(overlay.end_time)
            )),
        );
    let filter = if per_frame { filter.kv("eval", "frame") } else { filter };
    // A looped image never ends; the main video decides the length.
    if loops_image(overlay) {
        filter.kv("shortest", 1)
    } else {
        filter
    }
}

/// Resting (x, y) expressions for a placement.
fn base_position(placement: Placement) -> (String, String) {
    let inset = EDGE_INSET;
    let (x, y) = match placement {
        Placement::Custom { x, y } => return (x.to_string(), y.to_string()),
        Placement::Preset(OverlayPosition::TopRight) => {
            (format!("main_w-overlay_w-{inset}"), inset.to_string())
        }
        Placement::Preset(OverlayPosition::BottomLeft) => {
            (inset.to_string(), format!("main_h-overlay_h-{inset}"))
        }
        Placement::Preset(OverlayPosition::BottomRight) => (
            format!("main_w-overlay_w-{inset}"),
            format!("main_h-overlay_h-{inset}"),
        ),
        Placement::Preset(OverlayPosition::Center) => (
            "(main_w-overlay_w)/2".to_string(),
            "(main_h-overlay_h)/2".to_string(),
        ),
        Placement::Preset(OverlayPosition::TopLeft | OverlayPosition::Custom) => {
            (inset.to_string(), inset.to_string())
        }
    };
    (x, y)
}

/// Clamped animation progress `min(max((t-S)/D,0),1)`.
fn progress(start: f64, duration: f64) -> String {
    format!("min(max((t-{})/{},0),1)", secs(start), secs(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overlays: &[ImageOverlay]) -> FfmpegCommand {
        build_overlay("in.mp4", overlays, Path::new("out.mp4"), &EncodingConfig::default()).unwrap()
    }

    #[test]
    fn test_static_overlay() {
        let cmd = build(&[ImageOverlay::new("logo.png", 2.0, 6.0).at(OverlayPosition::BottomRight)]);
        assert_eq!(
            cmd.graph().unwrap().to_string(),
            "[1:v]null[ov0];[0:v][ov0]overlay=x=main_w-overlay_w-10:y=main_h-overlay_h-10:\
             enable='gte(t,2.00)*lt(t,6.00)'[outv]"
        );

        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a?"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "23"));
    }

    #[test]
    fn test_fade_window() {
        let cmd = build(&[ImageOverlay::new("logo.png", 0.0, 5.0).with_fade(1.0)]);
        let graph = cmd.graph().unwrap();

        let fades: Vec<_> = graph.filters_named("fade").collect();
        assert_eq!(fades.len(), 2);
        // fade-in covers [0, 1)
        assert_eq!(fades[0].get("t"), Some("in"));
        assert_eq!(fades[0].get("st"), Some("0.00"));
        assert_eq!(fades[0].get("d"), Some("1.00"));
        // fade-out covers [4, 5)
        assert_eq!(fades[1].get("t"), Some("out"));
        assert_eq!(fades[1].get("st"), Some("4.00"));
        assert_eq!(fades[1].get("d"), Some("1.00"));

        assert!(graph.to_string().starts_with(
            "[1:v]format=rgba,fade=t=in:st=0.00:d=1.00:alpha=1,fade=t=out:st=4.00:d=1.00:alpha=1[ov0]"
        ));
    }

    #[test]
    fn test_animated_image_is_looped() {
        let cmd = build(&[
            ImageOverlay::new("static.png", 0.0, 2.0),
            ImageOverlay::new("fade.png", 0.0, 5.0).with_fade(1.0),
            ImageOverlay::new("zoom.png", 1.0, 5.0).with_zoom(1.0, 2.0),
        ]);

        let inputs = cmd.inputs();
        assert!(inputs[1].args.is_empty());
        assert_eq!(inputs[2].args, vec!["-loop", "1"]);
        assert_eq!(inputs[3].args, vec!["-loop", "1"]);

        let args = cmd.build_args();
        let fade_at = args.iter().position(|a| a == "fade.png").unwrap();
        assert_eq!(&args[fade_at - 3..fade_at], &["-loop", "1", "-i"]);

        let composites: Vec<_> = cmd.graph().unwrap().filters_named("overlay").collect();
        assert_eq!(composites[0].get("shortest"), None);
        assert_eq!(composites[1].get("shortest"), Some("1"));
        assert_eq!(composites[2].get("shortest"), Some("1"));
    }

    #[test]
    fn test_positions() {
        let cases = [
            (OverlayPosition::TopLeft, "10", "10"),
            (OverlayPosition::TopRight, "main_w-overlay_w-10", "10"),
            (OverlayPosition::BottomLeft, "10", "main_h-overlay_h-10"),
            (OverlayPosition::Center, "(main_w-overlay_w)/2", "(main_h-overlay_h)/2"),
        ];
        for (position, x, y) in cases {
            let f = overlay_filter(&ImageOverlay::new("logo.png", 0.0, 1.0).at(position));
            assert_eq!(f.get("x"), Some(x));
            assert_eq!(f.get("y"), Some(y));
        }

        let f = overlay_filter(&ImageOverlay::new("logo.png", 0.0, 1.0).at_xy(40, 60));
        assert_eq!(f.get("x"), Some("40"));
        assert_eq!(f.get("y"), Some("60"));
    }

    #[test]
    fn test_slide_from_left() {
        let overlay = ImageOverlay::new("logo.png", 2.0, 8.0).with_slide(SlideDirection::Left, 1.5);
        let f = overlay_filter(&overlay);
        assert_eq!(
            f.get("x"),
            Some("'-overlay_w+min(max((t-2.00)/1.50,0),1)*(overlay_w+10)'")
        );
        assert_eq!(f.get("y"), Some("10"));
        assert_eq!(f.get("eval"), Some("frame"));
    }

    #[test]
    fn test_slide_from_bottom() {
        let overlay = ImageOverlay::new("logo.png", 0.0, 4.0)
            .at(OverlayPosition::Center)
            .with_slide(SlideDirection::Bottom, 1.0);
        let f = overlay_filter(&overlay);
        assert_eq!(f.get("x"), Some("(main_w-overlay_w)/2"));
        assert_eq!(
            f.get("y"),
            Some("'main_h-min(max((t-0.00)/1.00,0),1)*(main_h-(main_h-overlay_h)/2)'")
        );
    }

    #[test]
    fn test_zoom_scale() {
        let cmd = build(&[ImageOverlay::new("logo.png", 1.0, 5.0).with_zoom(1.0, 2.0)]);
        let graph = cmd.graph().unwrap();
        let scale = graph.filters_named("scale").next().unwrap();
        assert_eq!(
            scale.get("w"),
            Some("'iw*(1.00+(2.00-1.00)*min(max((t-1.00)/4.00,0),1))'")
        );
        assert_eq!(scale.get("eval"), Some("frame"));
    }

    #[test]
    fn test_overlays_chain_in_order() {
        let cmd = build(&[
            ImageOverlay::new("a.png", 0.0, 2.0),
            ImageOverlay::new("b.png", 1.0, 3.0),
            ImageOverlay::new("c.png", 2.0, 4.0),
        ]);
        let graph = cmd.graph().unwrap();
        let composites: Vec<_> = graph
            .chains
            .iter()
            .filter(|c| c.has_filter("overlay"))
            .collect();
        assert_eq!(composites.len(), 3);
        assert_eq!(composites[0].inputs, vec![StreamRef::video(0), StreamRef::label("ov0")]);
        assert_eq!(composites[1].inputs, vec![StreamRef::label("v1"), StreamRef::label("ov1")]);
        assert_eq!(composites[2].inputs, vec![StreamRef::label("v2"), StreamRef::label("ov2")]);
        assert_eq!(composites[2].outputs, vec![StreamRef::label("outv")]);

        let paths: Vec<_> = cmd.inputs().iter().map(|i| i.path.to_string_lossy().to_string()).collect();
        assert_eq!(paths, vec!["in.mp4", "a.png", "b.png", "c.png"]);
    }
}
