//! Job service core.
//!
//! This crate provides:
//! - The job store with crash-resilient JSON records
//! - The orchestrator that runs each job through the media pipeline
//! - The periodic retention sweeper
//! - Webhook notification and remote input download
//! - Service configuration and structured job logging

pub mod config;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod orchestrator;
pub mod persistence;
pub mod store;
pub mod sweeper;

pub use config::JobsConfig;
pub use downloader::Downloader;
pub use error::{JobsError, JobsResult};
pub use logging::JobLogger;
pub use notifier::{NotificationSink, WebhookNotifier};
pub use orchestrator::{JobReceipt, Orchestrator, SubmitOptions};
pub use persistence::{JobPersistence, JobRecord};
pub use store::JobStore;
pub use sweeper::{RetentionSweeper, SweepReport, SweeperHandle};
