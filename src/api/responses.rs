use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, ErrorEnvelope, TaxonomyCode};
use crate::observability::AggregatedHealth;
use crate::webhooks::WebhookOutcome;

/// Standard success envelope every handler wraps its payload in.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Wraps [`AppError`] so handlers can return it directly with `?` and
/// have axum render the crate-wide [`ErrorEnvelope`] shape.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4();
        let status = match self.0.taxonomy_code() {
            TaxonomyCode::InvalidRequest => StatusCode::BAD_REQUEST,
            TaxonomyCode::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            TaxonomyCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            TaxonomyCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            TaxonomyCode::Transient => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let envelope = ErrorEnvelope::from_error(&self.0, correlation_id);
        (status, Json(envelope)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub health: AggregatedHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookResponseOutcome {
    Applied,
    Duplicate,
    LateOrOutOfOrder,
}

impl From<WebhookOutcome> for WebhookResponseOutcome {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Applied => WebhookResponseOutcome::Applied,
            WebhookOutcome::Duplicate => WebhookResponseOutcome::Duplicate,
            WebhookOutcome::LateOrOutOfOrder => WebhookResponseOutcome::LateOrOutOfOrder,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub outcome: WebhookResponseOutcome,
}
