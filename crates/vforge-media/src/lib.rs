//! FFmpeg integration for the vforge job service.
//!
//! This crate provides:
//! - A typed filter graph and FFmpeg command builder
//! - Request to invocation translation (merge, overlay, audio, complete, concat)
//! - A bounded-concurrency execution gate with deadlines and cancellation
//! - A staged pipeline runner that cleans up intermediate artifacts

pub mod builder;
pub mod command;
pub mod error;
pub mod fs_utils;
pub mod gate;
pub mod graph;
pub mod pipeline;

pub use builder::{build, plan, plan_complete, Stage, StageKind};
pub use command::{check_ffmpeg, FfmpegCommand};
pub use error::{MediaError, MediaResult};
pub use gate::{ExecutionGate, FfmpegProcess, JobContext, ProcessOutput, ProcessRunner};
pub use graph::{Filter, FilterArg, FilterChain, FilterGraph, StreamKind, StreamRef};
pub use pipeline::Pipeline;
