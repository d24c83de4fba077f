//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    add_audio, add_overlay, combine_videos, download_job_output, get_job_status, health,
    merge_videos, process_complete, upload_file, upload_multiple,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    api_key_auth, cors_layer, rate_limit_middleware, request_id, request_logging,
    security_headers, ClientRateLimiter,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/video/merge", post(merge_videos))
        .route("/video/overlay", post(add_overlay))
        .route("/video/audio", post(add_audio))
        .route("/video/process", post(process_complete))
        .route("/video/combine", post(combine_videos));

    let job_routes = Router::new()
        .route("/jobs/:job_id", get(get_job_status))
        .route("/jobs/:job_id/download", get(download_job_output));

    let upload_routes = Router::new()
        .route("/upload", post(upload_file))
        .route("/upload/multiple", post(upload_multiple));

    // Everything but health requires the API key when one is configured
    let protected_routes = Router::new()
        .merge(video_routes)
        .merge(job_routes)
        .merge(upload_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    let rate_limiter = Arc::new(ClientRateLimiter::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(metrics_routes)
        // Uploads are bounded by MAX_BODY_SIZE instead of the extractor default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
