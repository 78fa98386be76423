use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Entry direction for double-entry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entry_direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl EntryDirection {
    pub fn opposite(&self) -> Self {
        match self {
            EntryDirection::Debit => EntryDirection::Credit,
            EntryDirection::Credit => EntryDirection::Debit,
        }
    }

    pub fn sign(&self) -> i64 {
        match self {
            EntryDirection::Debit => 1,
            EntryDirection::Credit => -1,
        }
    }
}

/// A single append-only ledger row. Entries are never mutated or
/// deleted; `post` only ever appends.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub pair_id: String,
    pub account: String,
    pub direction: EntryDirection,
    pub amount_minor: i64,
    pub currency: Currency,
    pub transaction_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        pair_id: impl Into<String>,
        account: impl Into<String>,
        direction: EntryDirection,
        amount_minor: i64,
        currency: Currency,
        transaction_ref: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            pair_id: pair_id.into(),
            account: account.into(),
            direction,
            amount_minor,
            currency,
            transaction_ref,
            created_at: now,
        }
    }

    pub fn debit(
        pair_id: impl Into<String>,
        account: impl Into<String>,
        amount_minor: i64,
        currency: Currency,
        transaction_ref: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(pair_id, account, EntryDirection::Debit, amount_minor, currency, transaction_ref, now)
    }

    pub fn credit(
        pair_id: impl Into<String>,
        account: impl Into<String>,
        amount_minor: i64,
        currency: Currency,
        transaction_ref: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(pair_id, account, EntryDirection::Credit, amount_minor, currency, transaction_ref, now)
    }

    pub fn signed_amount(&self) -> i64 {
        self.direction.sign() * self.amount_minor
    }
}

/// A balanced set of ledger entries sharing one `pair_id`, validated
/// before `Ledger::post` will accept it.
#[derive(Debug, Clone)]
pub struct LedgerEntrySet {
    pub pair_id: String,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerEntrySetError {
    #[error("ledger entry set is empty")]
    Empty,
    #[error("entries in a set must share one pair_id")]
    MixedPairIds,
    #[error("entries in a set must share one currency")]
    MixedCurrencies,
    #[error("unbalanced entry set: debits {debits} != credits {credits}")]
    Unbalanced { debits: i64, credits: i64 },
}

impl LedgerEntrySet {
    pub fn new(pair_id: impl Into<String>, entries: Vec<LedgerEntry>) -> Result<Self, LedgerEntrySetError> {
        let pair_id = pair_id.into();
        if entries.is_empty() {
            return Err(LedgerEntrySetError::Empty);
        }
        if entries.iter().any(|e| e.pair_id != pair_id) {
            return Err(LedgerEntrySetError::MixedPairIds);
        }
        let currency = entries[0].currency;
        if entries.iter().any(|e| e.currency != currency) {
            return Err(LedgerEntrySetError::MixedCurrencies);
        }

        let debits: i64 = entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Debit)
            .map(|e| e.amount_minor)
            .sum();
        let credits: i64 = entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Credit)
            .map(|e| e.amount_minor)
            .sum();
        if debits != credits {
            return Err(LedgerEntrySetError::Unbalanced { debits, credits });
        }

        Ok(Self { pair_id, entries })
    }

    pub fn currency(&self) -> Currency {
        self.entries[0].currency
    }

    pub fn total(&self) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.direction == EntryDirection::Debit)
            .map(|e| e.amount_minor)
            .sum()
    }

    /// True if this set is identical (same entries, order-insensitive
    /// on account/direction/amount) to `other` — used to decide
    /// whether a repeated `post` call is an idempotent replay or a
    /// genuine conflict.
    pub fn is_equivalent_to(&self, other: &LedgerEntrySet) -> bool {
        if self.pair_id != other.pair_id || self.entries.len() != other.entries.len() {
            return false;
        }
        let mut mine: Vec<(String, EntryDirection, i64, Currency)> = self
            .entries
            .iter()
            .map(|e| (e.account.clone(), e.direction, e.amount_minor, e.currency))
            .collect();
        let mut theirs: Vec<(String, EntryDirection, i64, Currency)> = other
            .entries
            .iter()
            .map(|e| (e.account.clone(), e.direction, e.amount_minor, e.currency))
            .collect();
        mine.sort();
        theirs.sort();
        mine == theirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pair: &str, account: &str, dir: EntryDirection, amount: i64) -> LedgerEntry {
        LedgerEntry::new(pair, account, dir, amount, Currency::USD, None, Utc::now())
    }

    #[test]
    fn balanced_pair_is_accepted() {
        let set = LedgerEntrySet::new(
            "tx:1:capture",
            vec![
                entry("tx:1:capture", "fan_receivable", EntryDirection::Debit, 1000),
                entry("tx:1:capture", "creator_payable", EntryDirection::Credit, 1000),
            ],
        );
        assert!(set.is_ok());
        assert_eq!(set.unwrap().total(), 1000);
    }

    #[test]
    fn unbalanced_set_is_rejected() {
        let set = LedgerEntrySet::new(
            "tx:1:capture",
            vec![
                entry("tx:1:capture", "fan_receivable", EntryDirection::Debit, 1000),
                entry("tx:1:capture", "creator_payable", EntryDirection::Credit, 900),
            ],
        );
        assert_eq!(
            set.unwrap_err(),
            LedgerEntrySetError::Unbalanced { debits: 1000, credits: 900 }
        );
    }

    #[test]
    fn mixed_currency_set_is_rejected() {
        let mut credit = entry("tx:1:capture", "creator_payable", EntryDirection::Credit, 1000);
        credit.currency = Currency::EUR;
        let set = LedgerEntrySet::new(
            "tx:1:capture",
            vec![entry("tx:1:capture", "fan_receivable", EntryDirection::Debit, 1000), credit],
        );
        assert_eq!(set.unwrap_err(), LedgerEntrySetError::MixedCurrencies);
    }

    #[test]
    fn three_leg_capture_with_fees_balances() {
        // debit fan_receivable 1000; credit creator_payable 921;
        // credit platform_fee_revenue 50; credit processor_fee_expense 29.
        let set = LedgerEntrySet::new(
            "tx:1:capture",
            vec![
                entry("tx:1:capture", "fan_receivable", EntryDirection::Debit, 1000),
                entry("tx:1:capture", "creator_payable", EntryDirection::Credit, 921),
                entry("tx:1:capture", "platform_fee_revenue", EntryDirection::Credit, 50),
                entry("tx:1:capture", "processor_fee_expense", EntryDirection::Credit, 29),
            ],
        );
        assert!(set.is_ok());
    }

    #[test]
    fn equivalent_sets_ignore_entry_ordering() {
        let a = LedgerEntrySet::new(
            "tx:1:capture",
            vec![
                entry("tx:1:capture", "a", EntryDirection::Debit, 100),
                entry("tx:1:capture", "b", EntryDirection::Credit, 100),
            ],
        )
        .unwrap();
        let b = LedgerEntrySet::new(
            "tx:1:capture",
            vec![
                entry("tx:1:capture", "b", EntryDirection::Credit, 100),
                entry("tx:1:capture", "a", EntryDirection::Debit, 100),
            ],
        )
        .unwrap();
        assert!(a.is_equivalent_to(&b));
    }
}
