//! Axum HTTP API server for the vforge job service.
//!
//! This crate provides:
//! - Processing endpoints that answer with a job receipt
//! - Job status and output download
//! - File uploads for use as processing inputs
//! - API key authentication, rate limiting and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
