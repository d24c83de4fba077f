//! S3-compatible object storage for finished renders.
//!
//! This crate provides:
//! - Configuration from `S3_*` environment variables
//! - File upload with public URL generation
//! - Bucket provisioning

pub mod client;
pub mod error;

pub use client::{
    combined_object_key, ObjectUploader, S3Config, S3Uploader, DEFAULT_REGION, VIDEO_CONTENT_TYPE,
};
pub use error::{StorageError, StorageResult};
