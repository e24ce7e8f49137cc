//! HTTP surface: scrape endpoint and health checks

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use edgetag_core::{HealthStatus, ReadinessStatus};
use tracing::error;

use crate::service::ExporterState;

pub fn create_router(state: ExporterState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

async fn metrics(State(state): State<ExporterState>) -> Response {
    match state.registry.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.registry.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health(State(state): State<ExporterState>) -> Json<HealthStatus> {
    Json(state.health())
}

async fn ready(State(state): State<ExporterState>) -> (StatusCode, Json<ReadinessStatus>) {
    let readiness = state.readiness();
    let status = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(readiness))
}
