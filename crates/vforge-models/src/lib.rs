//! Shared data models for the vforge media job service.
//!
//! This crate provides Serde-serializable types for:
//! - Processing requests (merge, overlay, audio, complete, combine)
//! - Jobs and their state machine
//! - Encoding configuration
//! - Webhook payloads

pub mod audio;
pub mod encoding;
pub mod job;
pub mod job_status;
pub mod overlay;
pub mod request;
pub mod segment;
pub mod webhook;

// Re-export common types
pub use audio::AudioConfig;
pub use encoding::EncodingConfig;
pub use job::{Job, JobId, TransitionError};
pub use job_status::JobStatus;
pub use overlay::{Animation, AnimationKind, ImageOverlay, OverlayPosition, Placement, SlideDirection};
pub use request::{
    AudioMode, AudioRequest, CombineRequest, CombineSource, CompleteRequest, JobKind, MergeRequest,
    OverlayRequest, ProcessingRequest, RequestError, RequestResult,
};
pub use segment::VideoSegment;
pub use webhook::{WebhookHeader, WebhookPayload, WebhookTarget};
