use crate::models::{Currency, DisputeStage, PayoutBatchStatus, TransactionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One out-of-process topic per event family (§4.10).
pub mod topics {
    pub const TRANSACTIONS: &str = "fanztrust.transactions";
    pub const REFUNDS: &str = "fanztrust.refunds";
    pub const DISPUTES: &str = "fanztrust.disputes";
    pub const PAYOUTS: &str = "fanztrust.payouts";
    pub const TRUST_SCORES: &str = "fanztrust.trust_scores";
    pub const APPROVALS: &str = "fanztrust.approvals";
    pub const WEBHOOKS: &str = "fanztrust.webhooks";
    pub const SETTLEMENTS: &str = "fanztrust.settlements";
}

/// Discriminates the event families carried over the bus. One variant
/// per out-of-process topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TransactionStatusChanged,
    RefundIssued,
    DisputeOpened,
    DisputeResolved,
    PayoutBatchStatusChanged,
    TrustScoreComputed,
    ApprovalDecided,
    WebhookReceived,
    SettlementDiscrepancy,
}

impl EventType {
    pub fn topic(&self) -> &'static str {
        match self {
            EventType::TransactionStatusChanged => topics::TRANSACTIONS,
            EventType::RefundIssued => topics::REFUNDS,
            EventType::DisputeOpened | EventType::DisputeResolved => topics::DISPUTES,
            EventType::PayoutBatchStatusChanged => topics::PAYOUTS,
            EventType::TrustScoreComputed => topics::TRUST_SCORES,
            EventType::ApprovalDecided => topics::APPROVALS,
            EventType::WebhookReceived => topics::WEBHOOKS,
            EventType::SettlementDiscrepancy => topics::SETTLEMENTS,
        }
    }
}

/// Canonical envelope (§6). Every event that crosses the bus, in- or
/// out-of-process, is wrapped in this shape. `subject` identifies the
/// primary entity the event is about (a transaction id, a payout batch
/// id, ...); `schema_version` lets consumers evolve `data` without
/// breaking older readers mid-rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub subject: Uuid,
    pub source: String,
    pub schema_version: u16,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_type: EventType, subject: Uuid, data: T) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            occurred_at: Utc::now(),
            subject,
            source: "fanztrust".to_string(),
            schema_version: 1,
            data,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.event_type.topic()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatusChanged {
    pub transaction_id: Uuid,
    pub fan_id: Uuid,
    pub creator_id: Uuid,
    pub from_status: Option<TransactionStatus>,
    pub to_status: TransactionStatus,
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundIssued {
    pub refund_id: Uuid,
    pub transaction_id: Uuid,
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeLifecycle {
    pub dispute_id: Uuid,
    pub transaction_id: Uuid,
    pub stage: DisputeStage,
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutBatchStatusChanged {
    pub batch_id: Uuid,
    pub status: PayoutBatchStatus,
    pub payout_count: i32,
    pub net_minor: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScoreComputed {
    pub score_id: Uuid,
    pub subject_ref: Uuid,
    pub score: i16,
    pub decision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecided {
    pub approval_id: Uuid,
    pub entity_ref: Uuid,
    pub approved: bool,
    pub decided_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookReceived {
    pub processor_id: String,
    pub processor_event_id: String,
    pub event_kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementDiscrepancy {
    pub settlement_id: Uuid,
    pub processor_id: String,
    pub currency: Currency,
    pub missing_count: usize,
    pub unexpected_count: usize,
    pub mismatch_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_routes_to_its_family_topic() {
        let subject = Uuid::new_v4();
        let payload = RefundIssued {
            refund_id: Uuid::new_v4(),
            transaction_id: subject,
            amount_minor: 500,
            currency: Currency::USD,
        };
        let envelope = EventEnvelope::new(EventType::RefundIssued, subject, payload);
        assert_eq!(envelope.topic(), topics::REFUNDS);
        assert_eq!(envelope.schema_version, 1);
    }

    #[test]
    fn envelope_serializes_with_snake_case_event_type() {
        let subject = Uuid::new_v4();
        let envelope = EventEnvelope::new(
            EventType::TrustScoreComputed,
            subject,
            TrustScoreComputed {
                score_id: Uuid::new_v4(),
                subject_ref: subject,
                score: 72,
                decision: "allow".to_string(),
            },
        );
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"trust_score_computed\""));
    }
}
