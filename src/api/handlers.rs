use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use crate::api::responses::{ApiError, ApiResponse, HealthResponse, WebhookResponse};

use super::routes::AppState;

/// Full dependency health, mirrored at `/health` for operators and
/// load balancer checks alike.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_healthy() {
        StatusCode::OK
    } else if health.status.is_degraded() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, ApiResponse::ok(HealthResponse { health }))
}

pub async fn liveness_handler(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}

const SIGNATURE_HEADER: &str = "x-webhook-signature";
const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Ingests one processor webhook delivery (§4.7). The processor
/// signature and timestamp travel as headers; the body bytes are the
/// exact payload the signature was computed over.
pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(processor_id): Path<String>,
    headers: HeaderMap,
    raw_body: axum::body::Bytes,
) -> Result<Json<ApiResponse<WebhookResponse>>, ApiError> {
    let signature_hex = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| crate::error::AppError::Validation("missing signature header".to_string()))?;
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| crate::error::AppError::Validation("missing or malformed timestamp header".to_string()))?;

    let outcome = state
        .webhook_ingestor
        .ingest(&processor_id, timestamp, &raw_body, signature_hex)
        .await?;

    Ok(Json(ApiResponse::ok(WebhookResponse { outcome: outcome.into() })))
}
