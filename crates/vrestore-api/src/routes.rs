//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::history::{insert_record, list_records};
use crate::handlers::predictions::{get_prediction, replicate_webhook, submit_prediction};
use crate::handlers::upload::relay_upload;
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let upload_routes = Router::new().route("/cloudinary", post(relay_upload));

    let prediction_routes = Router::new()
        .route("/replicate", post(submit_prediction))
        .route("/replicate/prediction", get(get_prediction));

    let history_routes = Router::new()
        .route("/db", post(insert_record))
        .route("/db", get(list_records));

    // Create rate limiter for client-facing routes
    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(upload_routes)
        .merge(prediction_routes)
        .merge(history_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    // Provider redelivery is the recovery path for failed cache writes, so
    // the webhook stays outside the per-client rate limit.
    let webhook_routes = Router::new().route("/replicate/webhook", post(replicate_webhook));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api/v1", api_routes.merge(webhook_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        // SECURITY: Request body size limit to prevent DoS attacks
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
