use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Approved,
    Denied,
    Processed,
    Failed,
}

impl RefundStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefundStatus::Denied | RefundStatus::Processed | RefundStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_decision_source", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum RefundDecisionSource {
    Auto,
    Manual,
    Chargeback,
}

/// Owns a back-reference to its parent `Transaction`; `amount_minor`
/// MUST NOT exceed the transaction's remaining refundable amount at
/// creation time (enforced by the orchestrator, not this type).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Refund {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub amount_minor: i64,
    pub currency: Currency,
    pub status: RefundStatus,
    pub reason: String,
    pub decision_source: Option<RefundDecisionSource>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn new(
        transaction_id: Uuid,
        amount_minor: i64,
        currency: Currency,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            amount_minor,
            currency,
            status: RefundStatus::Pending,
            reason: reason.into(),
            decision_source: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn decide(&mut self, status: RefundStatus, source: RefundDecisionSource, now: DateTime<Utc>) {
        self.status = status;
        self.decision_source = Some(source);
        self.version += 1;
        self.updated_at = now;
    }
}

/// External-initiated; writing a response transitions `stage` and may
/// move the parent Transaction to `refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dispute_stage", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum DisputeStage {
    Initial,
    ResponseDue,
    PreArbitration,
    Arbitration,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dispute_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    Chargeback,
    Retrieval,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub dispute_type: DisputeType,
    pub stage: DisputeStage,
    pub deadline_at: DateTime<Utc>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    pub fn new(
        transaction_id: Uuid,
        dispute_type: DisputeType,
        deadline_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            dispute_type,
            stage: DisputeStage::Initial,
            deadline_at,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn respond(&mut self, now: DateTime<Utc>) {
        self.stage = DisputeStage::ResponseDue;
        self.version += 1;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_decision_marks_terminal_and_bumps_version() {
        let now = Utc::now();
        let mut refund = Refund::new(Uuid::new_v4(), 1000, Currency::USD, "customer_request", now);
        refund.decide(RefundStatus::Processed, RefundDecisionSource::Auto, now);
        assert!(refund.status.is_terminal());
        assert_eq!(refund.version, 1);
        assert_eq!(refund.decision_source, Some(RefundDecisionSource::Auto));
    }

    #[test]
    fn retrieval_dispute_is_distinguishable_from_chargeback() {
        let now = Utc::now();
        let deadline = now + chrono::Duration::days(7);
        let retrieval = Dispute::new(Uuid::new_v4(), DisputeType::Retrieval, deadline, now);
        assert_eq!(retrieval.dispute_type, DisputeType::Retrieval);
        assert_eq!(retrieval.stage, DisputeStage::Initial);
    }
}
