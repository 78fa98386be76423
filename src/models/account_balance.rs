use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::currency::Currency;

/// Derived creator balance, cached alongside the Ledger rather than
/// stored as a source of truth (§4.1): recomputed from
/// `LedgerEntry` rows for `account = "creator:<id>"` and refreshed on
/// every posted entry touching that account. `available_minor` is what
/// a payout may draw against; `pending_minor` covers captures not yet
/// past the processor's settlement window.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountBalance {
    pub creator_id: Uuid,
    pub currency: Currency,
    pub available_minor: i64,
    pub pending_minor: i64,
    pub reserved_minor: i64,
    pub version: i32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("insufficient funds: requested {requested}, available {available}")]
pub struct InsufficientFundsError {
    pub requested: i64,
    pub available: i64,
}

impl AccountBalance {
    pub fn new(creator_id: Uuid, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            creator_id,
            currency,
            available_minor: 0,
            pending_minor: 0,
            reserved_minor: 0,
            version: 0,
            last_updated: now,
        }
    }

    pub fn total_minor(&self) -> i64 {
        self.available_minor + self.pending_minor + self.reserved_minor
    }

    pub fn usable_minor(&self) -> i64 {
        self.available_minor - self.reserved_minor
    }

    pub fn has_sufficient_funds(&self, amount_minor: i64) -> bool {
        self.usable_minor() >= amount_minor
    }

    pub fn credit(&mut self, amount_minor: i64, at: DateTime<Utc>) {
        self.available_minor += amount_minor;
        self.version += 1;
        self.last_updated = at;
    }

    pub fn debit(&mut self, amount_minor: i64, at: DateTime<Utc>) -> Result<(), InsufficientFundsError> {
        if !self.has_sufficient_funds(amount_minor) {
            return Err(InsufficientFundsError { requested: amount_minor, available: self.usable_minor() });
        }
        self.available_minor -= amount_minor;
        self.version += 1;
        self.last_updated = at;
        Ok(())
    }

    /// Reserves funds against an in-flight payout approval.
    pub fn reserve(&mut self, amount_minor: i64, at: DateTime<Utc>) -> Result<(), InsufficientFundsError> {
        if self.available_minor < amount_minor {
            return Err(InsufficientFundsError { requested: amount_minor, available: self.available_minor });
        }
        self.available_minor -= amount_minor;
        self.reserved_minor += amount_minor;
        self.version += 1;
        self.last_updated = at;
        Ok(())
    }

    pub fn release_reservation(&mut self, amount_minor: i64, at: DateTime<Utc>) {
        let released = amount_minor.min(self.reserved_minor);
        self.reserved_minor -= released;
        self.available_minor += released;
        self.version += 1;
        self.last_updated = at;
    }

    pub fn move_to_pending(&mut self, amount_minor: i64, at: DateTime<Utc>) -> Result<(), InsufficientFundsError> {
        if self.available_minor < amount_minor {
            return Err(InsufficientFundsError { requested: amount_minor, available: self.available_minor });
        }
        self.available_minor -= amount_minor;
        self.pending_minor += amount_minor;
        self.version += 1;
        self.last_updated = at;
        Ok(())
    }

    pub fn settle_pending(&mut self, amount_minor: i64, at: DateTime<Utc>) {
        let settled = amount_minor.min(self.pending_minor);
        self.pending_minor -= settled;
        self.available_minor += settled;
        self.version += 1;
        self.last_updated = at;
    }
}
