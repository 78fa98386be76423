use super::currency::Currency;
use super::payment_method::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Payment state machine, §4.6. `Captured` and `Settled` are the only
/// states a successfully-paid transaction passes through after
/// authorization; everything else is terminal or intermediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Initiated,
    Verified,
    RequiresVerification,
    Routed,
    Authorized,
    Captured,
    Settled,
    Blocked,
    Failed,
    Refunded,
    ChargedBack,
    Disputed,
    Responded,
}

impl TransactionStatus {
    /// Terminal states never accept a further transition (Testable
    /// Properties §8, "status monotonicity").
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Blocked
                | TransactionStatus::Failed
                | TransactionStatus::Refunded
                | TransactionStatus::ChargedBack
        )
    }

    pub fn valid_next_states(&self) -> &'static [TransactionStatus] {
        use TransactionStatus::*;
        match self {
            Initiated => &[Verified, Blocked, Failed, RequiresVerification],
            RequiresVerification => &[Verified, Blocked, Failed],
            Verified => &[Routed, Failed],
            Routed => &[Authorized, Blocked, Failed],
            Authorized => &[Captured, Failed],
            Captured => &[Settled, Refunded, Disputed, Failed],
            Settled => &[Refunded, Disputed],
            Disputed => &[Responded, Refunded, ChargedBack],
            Responded => &[Refunded, ChargedBack],
            Blocked | Failed | Refunded | ChargedBack => &[],
        }
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        self.valid_next_states().contains(&next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction transition from {from:?} to {to:?}")]
pub struct InvalidTransitionError {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

/// Core payment record. `net_amount_minor = amount_minor - fees_minor`
/// at every observable state (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub fan_id: Uuid,
    pub creator_id: Uuid,
    pub platform: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub fees_minor: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_account_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub trust_score: Option<i16>,
    pub risk_flags: serde_json::Value,
    pub processor_response: Option<serde_json::Value>,
    pub refunded_total_minor: i64,
    pub version: i32,
    pub initiated_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        fan_id: Uuid,
        creator_id: Uuid,
        platform: impl Into<String>,
        amount_minor: i64,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fan_id,
            creator_id,
            platform: platform.into(),
            amount_minor,
            currency,
            fees_minor: 0,
            processor_id: None,
            merchant_account_id: None,
            status: TransactionStatus::Initiated,
            trust_score: None,
            risk_flags: serde_json::json!([]),
            processor_response: None,
            refunded_total_minor: 0,
            version: 0,
            initiated_at: now,
            authorized_at: None,
            captured_at: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn net_amount_minor(&self) -> i64 {
        self.amount_minor - self.fees_minor
    }

    pub fn remaining_refundable_minor(&self) -> i64 {
        self.amount_minor - self.refunded_total_minor
    }

    pub fn risk_flag_set(&self) -> BTreeSet<String> {
        serde_json::from_value(self.risk_flags.clone()).unwrap_or_default()
    }

    /// Applies a status transition, bumping `version`. Rejects any
    /// move that the state machine doesn't allow and any attempt to
    /// leave a terminal state.
    pub fn transition_to(
        &mut self,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransitionError { from: self.status, to: next });
        }
        self.status = next;
        self.version += 1;
        self.updated_at = now;
        match next {
            TransactionStatus::Authorized => self.authorized_at = Some(self.updated_at),
            TransactionStatus::Captured => self.captured_at = Some(self.updated_at),
            TransactionStatus::Failed | TransactionStatus::Blocked => {
                self.failed_at = Some(self.updated_at)
            }
            _ => {}
        }
        Ok(())
    }
}

/// Append-only row, one per state change or processor callback (§3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionEvent {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub event_kind: String,
    pub event_source: String,
    pub amount_delta_minor: i64,
    pub processor_event_id: Option<String>,
    pub success: bool,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionEvent {
    pub fn new(
        transaction_id: Uuid,
        event_kind: impl Into<String>,
        event_source: impl Into<String>,
        amount_delta_minor: i64,
        success: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            event_kind: event_kind.into(),
            event_source: event_source.into(),
            amount_delta_minor,
            processor_event_id: None,
            success,
            error_code: None,
            created_at: now,
        }
    }

    pub fn with_processor_event_id(mut self, id: impl Into<String>) -> Self {
        self.processor_event_id = Some(id.into());
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.success = false;
        self
    }
}

/// Not persisted directly; used at orchestration boundaries to carry
/// the tagged payment method alongside a transaction reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub fan_id: Uuid,
    pub creator_id: Uuid,
    pub platform: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub idempotency_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn net_amount_subtracts_fees() {
        let mut tx = Transaction::new(Uuid::new_v4(), Uuid::new_v4(), "P1", 1000, Currency::USD, now());
        tx.fees_minor = 79;
        assert_eq!(tx.net_amount_minor(), 921);
    }

    #[test]
    fn happy_path_transition_sequence_succeeds() {
        let mut tx = Transaction::new(Uuid::new_v4(), Uuid::new_v4(), "P1", 1000, Currency::USD, now());
        tx.transition_to(TransactionStatus::Verified, now()).unwrap();
        tx.transition_to(TransactionStatus::Routed, now()).unwrap();
        tx.transition_to(TransactionStatus::Authorized, now()).unwrap();
        tx.transition_to(TransactionStatus::Captured, now()).unwrap();
        tx.transition_to(TransactionStatus::Settled, now()).unwrap();
        assert_eq!(tx.status, TransactionStatus::Settled);
        assert_eq!(tx.version, 5);
    }

    #[test]
    fn terminal_state_rejects_further_transitions() {
        let mut tx = Transaction::new(Uuid::new_v4(), Uuid::new_v4(), "P1", 1000, Currency::USD, now());
        tx.transition_to(TransactionStatus::Blocked, now()).unwrap();
        assert!(tx.status.is_terminal());
        let err = tx.transition_to(TransactionStatus::Verified, now()).unwrap_err();
        assert_eq!(err.from, TransactionStatus::Blocked);
    }

    #[test]
    fn cannot_skip_from_initiated_to_captured() {
        let mut tx = Transaction::new(Uuid::new_v4(), Uuid::new_v4(), "P1", 1000, Currency::USD, now());
        assert!(tx.transition_to(TransactionStatus::Captured, now()).is_err());
    }

    #[test]
    fn remaining_refundable_tracks_prior_refunds() {
        let mut tx = Transaction::new(Uuid::new_v4(), Uuid::new_v4(), "P1", 1000, Currency::USD, now());
        tx.refunded_total_minor = 400;
        assert_eq!(tx.remaining_refundable_minor(), 600);
    }
}
