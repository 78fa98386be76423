use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Discrepancy report attached to a `Settlement` after reconciliation
/// (§4.8): transactions captured in the batch window but missing from
/// the processor file, processor-file entries with no local match,
/// and amount mismatches on entries that do match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub missing_txids: Vec<Uuid>,
    pub unexpected_txids: Vec<String>,
    pub amount_mismatches: Vec<AmountMismatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountMismatch {
    pub transaction_id: Uuid,
    pub expected_minor: i64,
    pub reported_minor: i64,
}

impl DiscrepancyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_txids.is_empty() && self.unexpected_txids.is_empty() && self.amount_mismatches.is_empty()
    }
}

/// One row per processor settlement batch (§3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Settlement {
    pub id: Uuid,
    pub processor_id: String,
    pub batch_window_start: DateTime<Utc>,
    pub batch_window_end: DateTime<Utc>,
    pub currency: Currency,
    pub gross_minor: i64,
    pub fees_minor: i64,
    pub chargebacks_minor: i64,
    pub refunds_minor: i64,
    pub net_minor: i64,
    #[sqlx(json)]
    pub discrepancies: sqlx::types::Json<DiscrepancyReport>,
    pub reconciled: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    pub fn new(
        processor_id: impl Into<String>,
        batch_window_start: DateTime<Utc>,
        batch_window_end: DateTime<Utc>,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            processor_id: processor_id.into(),
            batch_window_start,
            batch_window_end,
            currency,
            gross_minor: 0,
            fees_minor: 0,
            chargebacks_minor: 0,
            refunds_minor: 0,
            net_minor: 0,
            discrepancies: sqlx::types::Json(DiscrepancyReport::default()),
            reconciled: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seals the settlement once reconciliation has run; sealed rows
    /// are never mutated further per the lifecycle rule in §3.
    pub fn seal(&mut self, discrepancies: DiscrepancyReport, now: DateTime<Utc>) {
        self.discrepancies = sqlx::types::Json(discrepancies);
        self.reconciled = true;
        self.version += 1;
        self.updated_at = now;
    }

    pub fn has_discrepancies(&self) -> bool {
        !self.discrepancies.0.is_clean()
    }
}
