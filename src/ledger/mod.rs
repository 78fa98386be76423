//! Append-only, N-way balanced double-entry ledger (§4.1).
//!
//! This supersedes the two-account transfer engine the rest of the
//! corpus still carries: a single `post` call accepts any number of
//! debit/credit legs sharing a `pair_id`, as long as they sum to zero
//! and share one currency. `creator_balances` is a separate derived
//! cache — posting to the ledger does not itself touch it; callers
//! that need the cache kept current update it in the same orchestration
//! step that calls `post`.

use crate::error::{AppError, Result};
use crate::models::{LedgerEntry, LedgerEntrySet};
use crate::repositories::LedgerRepository;
use chrono::{DateTime, Utc};

/// Filter for `Ledger::replay`. `account` and `pair_id` are mutually
/// exclusive lookup axes; when both are `None` the time range alone
/// bounds the scan.
#[derive(Debug, Clone, Default)]
pub struct ReplayFilter {
    pub account: Option<String>,
    pub pair_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl ReplayFilter {
    pub fn by_account(account: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            limit: 500,
            ..Default::default()
        }
    }

    pub fn by_pair_id(pair_id: impl Into<String>) -> Self {
        Self {
            pair_id: Some(pair_id.into()),
            limit: 500,
            ..Default::default()
        }
    }
}

/// The ledger service. Holds no balance state of its own; every read
/// goes back to `ledger_entries`.
pub struct Ledger {
    repository: LedgerRepository,
}

impl Ledger {
    pub fn new(repository: LedgerRepository) -> Self {
        Self { repository }
    }

    /// Posts a balanced entry set atomically. Idempotent on `pair_id`:
    /// a retry with the identical set of legs returns the
    /// already-persisted entries instead of inserting a duplicate; a
    /// retry with a *different* set of legs for a `pair_id` that
    /// already has balanced entries is a `LedgerConflict` (§4.1).
    pub async fn post(&self, set: LedgerEntrySet) -> Result<Vec<LedgerEntry>> {
        let existing = self.repository.find_by_pair_id(&set.pair_id).await?;

        if !existing.is_empty() {
            let existing_set = LedgerEntrySet::new(set.pair_id.clone(), existing.clone())
                .map_err(|e| AppError::LedgerConflict(e.to_string()))?;

            if existing_set.is_equivalent_to(&set) {
                return Ok(existing);
            }

            return Err(AppError::LedgerConflict(format!(
                "pair_id {} already has a differing balanced entry set",
                set.pair_id
            )));
        }

        self.repository.create_set(&set.entries).await
    }

    /// Derives an account's balance by summing signed entries up to
    /// `as_of` (defaults to now). This is the source-of-truth
    /// computation that `creator_balances` caches for hot reads.
    pub async fn balance(&self, account: &str, currency: &str, as_of: Option<DateTime<Utc>>) -> Result<i64> {
        self.repository
            .balance_as_of(account, currency, as_of.unwrap_or_else(Utc::now))
            .await
    }

    /// Replays entries matching a filter, for reconciliation and audit
    /// tooling. Exactly one of `account`/`pair_id` should be set; if
    /// both are `None` this falls back to a time-bounded scan.
    pub async fn replay(&self, filter: ReplayFilter) -> Result<Vec<LedgerEntry>> {
        if let Some(pair_id) = filter.pair_id {
            return self.repository.find_by_pair_id(&pair_id).await;
        }
        if let Some(account) = filter.account {
            return self.repository.find_by_account(&account, filter.limit, 0).await;
        }
        let since = filter.since.unwrap_or_else(|| Utc::now() - chrono::Duration::days(1));
        let until = filter.until.unwrap_or_else(Utc::now);
        self.repository.find_by_time_range(since, until, filter.limit).await
    }

    /// True when `pair_id` already has a complete, balanced entry set
    /// persisted — used by orchestration code to short-circuit a retry
    /// before attempting to rebuild the entry set from scratch.
    pub async fn is_posted(&self, pair_id: &str) -> Result<bool> {
        self.repository.pair_is_balanced(pair_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, EntryDirection};

    fn entry(pair: &str, account: &str, dir: EntryDirection, amount: i64) -> LedgerEntry {
        LedgerEntry::new(pair, account, dir, amount, Currency::USD, None, Utc::now())
    }

    #[test]
    fn replay_filter_by_account_defaults_to_a_sane_limit() {
        let filter = ReplayFilter::by_account("creator_payable:abc");
        assert_eq!(filter.account.as_deref(), Some("creator_payable:abc"));
        assert_eq!(filter.limit, 500);
    }

    #[test]
    fn entry_set_equivalence_used_for_idempotent_post_ignores_ordering() {
        let a = LedgerEntrySet::new(
            "tx:1:capture",
            vec![
                entry("tx:1:capture", "fan_receivable", EntryDirection::Debit, 1000),
                entry("tx:1:capture", "creator_payable", EntryDirection::Credit, 1000),
            ],
        )
        .unwrap();
        let b = LedgerEntrySet::new(
            "tx:1:capture",
            vec![
                entry("tx:1:capture", "creator_payable", EntryDirection::Credit, 1000),
                entry("tx:1:capture", "fan_receivable", EntryDirection::Debit, 1000),
            ],
        )
        .unwrap();
        assert!(a.is_equivalent_to(&b));
    }
}
