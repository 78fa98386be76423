use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_batch_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum PayoutBatchStatus {
    Open,
    Closed,
    Sent,
    Completed,
    Failed,
}

/// Aggregates many `Payout`s into one outbound file to a payout rail
/// (§3). `net_minor` is recomputed from member payouts on every
/// membership change so `Σ payouts.net = batch.net` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutBatch {
    pub id: Uuid,
    pub currency: Currency,
    pub status: PayoutBatchStatus,
    pub payout_count: i32,
    pub net_minor: i64,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PayoutBatchError {
    #[error("payout batch {0} is not open for new members")]
    NotOpen(Uuid),
    #[error("batch net {batch_net} does not equal sum of member nets {member_sum}")]
    NetMismatch { batch_net: i64, member_sum: i64 },
}

impl PayoutBatch {
    pub fn new(currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            currency,
            status: PayoutBatchStatus::Open,
            payout_count: 0,
            net_minor: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_member(&mut self, net_minor: i64, now: DateTime<Utc>) -> Result<(), PayoutBatchError> {
        if self.status != PayoutBatchStatus::Open {
            return Err(PayoutBatchError::NotOpen(self.id));
        }
        self.payout_count += 1;
        self.net_minor += net_minor;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn close(&mut self, now: DateTime<Utc>) {
        self.status = PayoutBatchStatus::Closed;
        self.version += 1;
        self.updated_at = now;
    }

    /// Verifies the batch-level invariant against the actual member
    /// sum fetched from the repository; called before a batch is sent.
    pub fn verify_net(&self, member_sum: i64) -> Result<(), PayoutBatchError> {
        if self.net_minor != member_sum {
            return Err(PayoutBatchError::NetMismatch { batch_net: self.net_minor, member_sum });
        }
        Ok(())
    }
}
