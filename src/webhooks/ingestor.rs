//! Webhook ingestion (§4.7). Every delivery is verified, deduplicated
//! by `(processor_id, external_event_id)` through the same
//! [`IdempotencyHandler`] the rest of the crate uses, translated into a
//! canonical kind, and applied against its transaction or payout. A
//! delivery whose target state machine has already moved past what the
//! webhook describes is recorded as late or duplicate rather than
//! rejected: the processor has no way of knowing what we've already
//! applied, and the state machines already refuse the backward
//! transition on their own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::error::{AppError, Result};
use crate::events::bus::EventBus;
use crate::events::types::{EventEnvelope, EventType, WebhookReceived as WebhookReceivedPayload};
use crate::idempotency::{IdempotencyAttributes, IdempotencyCheckResult, IdempotencyHandler, IdempotencyScope};
use crate::models::{DisputeType, TransactionEvent, TransactionStatus};
use crate::orchestrator::{PayoutOrchestrator, RefundOrchestrator};
use crate::processors::ProcessorRegistry;
use crate::repositories::TransactionRepository;

use super::signature::{self, SignatureError};

/// The canonical shape every processor's webhook is normalized to
/// before it reaches this ingestor. Real processors each shape their
/// own payload differently; a processor-specific translation step
/// alongside that processor's adapter is responsible for producing
/// this shape upstream of here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    AuthOk,
    AuthDeclined,
    CaptureOk,
    RefundOk,
    ChargebackReceived,
    SettlementReady,
    PayoutCompleted,
    PayoutFailed,
}

impl WebhookEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::AuthOk => "auth_ok",
            WebhookEventKind::AuthDeclined => "auth_declined",
            WebhookEventKind::CaptureOk => "capture_ok",
            WebhookEventKind::RefundOk => "refund_ok",
            WebhookEventKind::ChargebackReceived => "chargeback_received",
            WebhookEventKind::SettlementReady => "settlement_ready",
            WebhookEventKind::PayoutCompleted => "payout_completed",
            WebhookEventKind::PayoutFailed => "payout_failed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub external_event_id: String,
    pub kind: WebhookEventKind,
    pub transaction_id: Option<Uuid>,
    pub payout_id: Option<Uuid>,
    #[serde(default)]
    pub processor_reference: Option<String>,
    #[serde(default)]
    pub dispute_deadline_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    Duplicate,
    LateOrOutOfOrder,
}

pub struct WebhookIngestor {
    transactions: TransactionRepository,
    refunds: Arc<RefundOrchestrator>,
    payouts: Arc<PayoutOrchestrator>,
    processors: Arc<ProcessorRegistry>,
    idempotency: Arc<IdempotencyHandler>,
    events: Arc<EventBus>,
    config: WebhookConfig,
}

impl WebhookIngestor {
    pub fn new(
        transactions: TransactionRepository,
        refunds: Arc<RefundOrchestrator>,
        payouts: Arc<PayoutOrchestrator>,
        processors: Arc<ProcessorRegistry>,
        idempotency: Arc<IdempotencyHandler>,
        events: Arc<EventBus>,
        config: WebhookConfig,
    ) -> Self {
        Self { transactions, refunds, payouts, processors, idempotency, events, config }
    }

    /// Verifies, dedups, and applies one webhook delivery. `timestamp`
    /// and `signature_hex` come from the processor's signature headers;
    /// `raw_body` must be the exact bytes the signature was computed
    /// over.
    pub async fn ingest(
        &self,
        processor_id: &str,
        timestamp: i64,
        raw_body: &[u8],
        signature_hex: &str,
    ) -> Result<WebhookOutcome> {
        if raw_body.len() > self.config.max_body_bytes {
            return Err(AppError::Validation("webhook payload exceeds configured size limit".to_string()));
        }

        let adapter = self
            .processors
            .get(processor_id)
            .ok_or_else(|| AppError::Validation(format!("unknown processor '{processor_id}'")))?;

        signature::verify(adapter.webhook_secret(), timestamp, raw_body, signature_hex, self.config.tolerance_seconds)
            .map_err(|e| match e {
                SignatureError::StaleTimestamp => {
                    AppError::Validation("webhook timestamp outside tolerance window".to_string())
                }
                SignatureError::Mismatch | SignatureError::MalformedSignature => {
                    AppError::Validation("webhook signature verification failed".to_string())
                }
            })?;

        let payload: WebhookPayload = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::Validation(format!("malformed webhook payload: {e}")))?;

        let attrs = IdempotencyAttributes::scoped(
            IdempotencyScope::ProcessorEvent,
            processor_id,
            payload.external_event_id.clone(),
        );
        let idempotency_key = self.idempotency.generate_key(&attrs);
        let request_hash = self.idempotency.hash_request(&payload.external_event_id);

        match self
            .idempotency
            .check::<bool>(&idempotency_key, processor_id, payload.kind.as_str(), &request_hash)
            .await?
        {
            IdempotencyCheckResult::Duplicate(_) | IdempotencyCheckResult::Processing => {
                crate::observability::get_metrics().record_webhook_received(processor_id, "duplicate");
                return Ok(WebhookOutcome::Duplicate);
            }
            IdempotencyCheckResult::New => {}
        }

        self.events
            .publish(EventEnvelope::new(
                EventType::WebhookReceived,
                payload.transaction_id.or(payload.payout_id).unwrap_or(Uuid::nil()),
                WebhookReceivedPayload {
                    processor_id: processor_id.to_string(),
                    processor_event_id: payload.external_event_id.clone(),
                    event_kind: payload.kind.as_str().to_string(),
                },
            ))
            .await;

        let outcome = match self.apply(&payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = self.idempotency.fail(&idempotency_key, &e.to_string()).await;
                return Err(e);
            }
        };

        self.idempotency.complete(&idempotency_key, &true).await?;
        let outcome_label = match outcome {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::LateOrOutOfOrder => "late_or_out_of_order",
        };
        crate::observability::get_metrics().record_webhook_received(processor_id, outcome_label);
        Ok(outcome)
    }

    async fn apply(&self, payload: &WebhookPayload) -> Result<WebhookOutcome> {
        use WebhookEventKind::*;

        match payload.kind {
            AuthOk | AuthDeclined | CaptureOk => {
                let transaction_id = payload
                    .transaction_id
                    .ok_or_else(|| AppError::Validation("webhook missing transaction_id".to_string()))?;
                self.apply_transaction_transition(transaction_id, payload).await
            }
            RefundOk => {
                let transaction_id = payload
                    .transaction_id
                    .ok_or_else(|| AppError::Validation("webhook missing transaction_id".to_string()))?;
                self.record_confirmation(transaction_id, payload).await?;
                Ok(WebhookOutcome::Applied)
            }
            ChargebackReceived => {
                let transaction_id = payload
                    .transaction_id
                    .ok_or_else(|| AppError::Validation("webhook missing transaction_id".to_string()))?;
                let deadline = payload.dispute_deadline_at.ok_or_else(|| {
                    AppError::Validation("chargeback webhook missing dispute_deadline_at".to_string())
                })?;
                self.refunds.open_dispute(transaction_id, DisputeType::Chargeback, deadline).await?;
                Ok(WebhookOutcome::Applied)
            }
            SettlementReady => Ok(WebhookOutcome::Applied),
            PayoutCompleted => {
                let payout_id = payload
                    .payout_id
                    .ok_or_else(|| AppError::Validation("webhook missing payout_id".to_string()))?;
                self.apply_payout_outcome(payout_id, true).await
            }
            PayoutFailed => {
                let payout_id = payload
                    .payout_id
                    .ok_or_else(|| AppError::Validation("webhook missing payout_id".to_string()))?;
                self.apply_payout_outcome(payout_id, false).await
            }
        }
    }

    /// Applies an auth/capture confirmation or decline against its
    /// transaction. A transition the state machine rejects is treated
    /// as a late or duplicate delivery rather than surfaced as an
    /// error.
    async fn apply_transaction_transition(
        &self,
        transaction_id: Uuid,
        payload: &WebhookPayload,
    ) -> Result<WebhookOutcome> {
        let mut txn = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;

        let target = match payload.kind {
            WebhookEventKind::AuthOk => TransactionStatus::Authorized,
            WebhookEventKind::AuthDeclined => TransactionStatus::Failed,
            WebhookEventKind::CaptureOk => TransactionStatus::Captured,
            _ => unreachable!("apply_transaction_transition only handles auth/capture kinds"),
        };

        self.append_event(transaction_id, payload, target == TransactionStatus::Failed).await?;

        match txn.transition_to(target) {
            Ok(()) => {
                self.transactions
                    .update_with_version(&txn)
                    .await?
                    .ok_or(AppError::VersionConflict { entity: "transaction", id: transaction_id })?;
                Ok(WebhookOutcome::Applied)
            }
            Err(_) => Ok(WebhookOutcome::LateOrOutOfOrder),
        }
    }

    /// Refund confirmations don't drive the parent transaction's state
    /// machine — `RefundOrchestrator` already owns that transition when
    /// it processes the refund — so this only records the processor's
    /// confirmation on the transaction's event log.
    async fn record_confirmation(&self, transaction_id: Uuid, payload: &WebhookPayload) -> Result<()> {
        self.transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;
        self.append_event(transaction_id, payload, false).await?;
        Ok(())
    }

    async fn append_event(&self, transaction_id: Uuid, payload: &WebhookPayload, is_decline: bool) -> Result<()> {
        let event = TransactionEvent::new(transaction_id, payload.kind.as_str(), "webhook", 0, !is_decline)
            .with_processor_event_id(payload.external_event_id.clone());
        self.transactions.append_event(&event).await?;
        Ok(())
    }

    async fn apply_payout_outcome(&self, payout_id: Uuid, completed: bool) -> Result<WebhookOutcome> {
        let result = if completed {
            self.payouts.complete_payout(payout_id).await
        } else {
            self.payouts.fail_payout(payout_id).await
        };

        match result {
            Ok(_) => Ok(WebhookOutcome::Applied),
            Err(AppError::Validation(_)) => Ok(WebhookOutcome::LateOrOutOfOrder),
            Err(e) => Err(e),
        }
    }
}
