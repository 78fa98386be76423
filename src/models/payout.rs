use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Batched,
    Sent,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Failed | PayoutStatus::Cancelled)
    }

    pub fn valid_next_states(&self) -> &'static [PayoutStatus] {
        use PayoutStatus::*;
        match self {
            Pending => &[Approved, Failed, Cancelled],
            Approved => &[Batched, Failed, Cancelled],
            Batched => &[Sent, Failed],
            Sent => &[Completed, Failed],
            Completed | Failed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        self.valid_next_states().contains(&next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid payout transition from {from:?} to {to:?}")]
pub struct InvalidPayoutTransitionError {
    pub from: PayoutStatus,
    pub to: PayoutStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer,
    Crypto,
    Check,
}

/// A creator-directed outbound transfer (§3). `approved` requires the
/// creator's available balance (computed from the Ledger) to cover
/// `amount_minor + fees_minor`; that check lives in the orchestrator,
/// not here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payout {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub method: PayoutMethod,
    pub amount_minor: i64,
    pub currency: Currency,
    pub fees_minor: i64,
    pub net_minor: i64,
    pub status: PayoutStatus,
    pub tax_withholding_minor: i64,
    pub batch_id: Option<Uuid>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    pub fn new(
        creator_id: Uuid,
        method: PayoutMethod,
        amount_minor: i64,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id,
            method,
            amount_minor,
            currency,
            fees_minor: 0,
            net_minor: amount_minor,
            status: PayoutStatus::Pending,
            tax_withholding_minor: 0,
            batch_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(
        &mut self,
        next: PayoutStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidPayoutTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidPayoutTransitionError { from: self.status, to: next });
        }
        self.status = next;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn total_debit_minor(&self) -> i64 {
        self.amount_minor + self.fees_minor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_transitions() {
        let now = Utc::now();
        let mut payout = Payout::new(Uuid::new_v4(), PayoutMethod::BankTransfer, 92100, Currency::USD, now);
        payout.transition_to(PayoutStatus::Approved, now).unwrap();
        payout.transition_to(PayoutStatus::Batched, now).unwrap();
        payout.transition_to(PayoutStatus::Sent, now).unwrap();
        payout.transition_to(PayoutStatus::Completed, now).unwrap();
        assert!(payout.transition_to(PayoutStatus::Failed, now).is_err());
    }

    #[test]
    fn total_debit_includes_fees() {
        let now = Utc::now();
        let mut payout = Payout::new(Uuid::new_v4(), PayoutMethod::BankTransfer, 1000, Currency::USD, now);
        payout.fees_minor = 25;
        assert_eq!(payout.total_debit_minor(), 1025);
    }
}
