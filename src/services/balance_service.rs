//! Cache-through balance reads in front of the ledger-derived
//! `creator_balances` table (§4.1 supplement). Mutations always go
//! through the repository (optimistic-concurrency `UPDATE ...
//! RETURNING`) and then invalidate the cache rather than writing
//! through it, so a crash between the two never leaves a stale hit.

use crate::cache::BalanceCache;
use crate::error::Result;
use crate::models::{AccountBalance, Currency};
use crate::repositories::BalanceRepository;
use std::sync::Arc;
use uuid::Uuid;

pub struct BalanceService {
    repository: BalanceRepository,
    cache: Option<Arc<BalanceCache>>,
}

impl BalanceService {
    pub fn new(repository: BalanceRepository) -> Self {
        Self { repository, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<BalanceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Reads a creator's balance, trying the cache first and falling
    /// back to (and repopulating from) the database on a miss.
    pub async fn get(&self, creator_id: Uuid, currency: Currency) -> Result<AccountBalance> {
        let currency_str = currency.to_string();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(creator_id, &currency_str).await? {
                return Ok(hit);
            }
        }

        let balance = self.repository.get_or_create(creator_id, currency).await?;

        if let Some(cache) = &self.cache {
            cache.set(&balance).await?;
        }

        Ok(balance)
    }

    /// Invalidates the cached entry after a repository-side mutation.
    /// Callers that credit/debit/reserve must invoke this once the
    /// write commits.
    pub async fn invalidate(&self, creator_id: Uuid, currency: Currency) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.invalidate(creator_id, &currency.to_string()).await?;
        }
        Ok(())
    }
}
