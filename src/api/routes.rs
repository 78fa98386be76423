use axum::http::HeaderName;
use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::observability::HealthChecker;
use crate::orchestrator::{PaymentOrchestrator, PayoutOrchestrator, RefundOrchestrator};
use crate::settlement::SettlementEngine;
use crate::webhooks::WebhookIngestor;

use super::handlers;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers. Every field is an `Arc`
/// assembled once at startup; handlers never construct their own
/// repository/orchestrator instances.
#[derive(Clone)]
pub struct AppState {
    pub webhook_ingestor: Arc<WebhookIngestor>,
    pub payment_orchestrator: Arc<PaymentOrchestrator>,
    pub refund_orchestrator: Arc<RefundOrchestrator>,
    pub payout_orchestrator: Arc<PayoutOrchestrator>,
    pub settlement_engine: Arc<SettlementEngine>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics_handle: PrometheusHandle,
}

/// Builds the HTTP surface (§11): health, metrics, and processor
/// webhook ingestion. Payment, refund, payout, and settlement
/// orchestration are driven internally and by the approval sweeper, not
/// through a REST surface.
pub fn create_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/live", get(handlers::liveness_handler))
        .route("/ready", get(handlers::readiness_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/webhooks/:processor_id", post(handlers::webhook_handler))
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
}
