use crate::error::{AppError, Result};
use crate::models::{EntryDirection, LedgerEntry};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for `LedgerEntry` rows. The ledger is append-only: there
/// is no update or delete here, only `create_set` and the various
/// read paths used by balance recomputation and replay.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts every entry of a balanced set in one transaction.
    pub async fn create_set(&self, entries: &[LedgerEntry]) -> Result<Vec<LedgerEntry>> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let mut created = Vec::with_capacity(entries.len());

        for entry in entries {
            let row = sqlx::query_as::<_, LedgerEntry>(
                r#"
                INSERT INTO ledger_entries (entry_id, pair_id, account, direction, amount_minor, currency, transaction_ref, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING entry_id, pair_id, account, direction, amount_minor, currency, transaction_ref, created_at
                "#,
            )
            .bind(entry.entry_id)
            .bind(&entry.pair_id)
            .bind(&entry.account)
            .bind(entry.direction)
            .bind(entry.amount_minor)
            .bind(entry.currency)
            .bind(entry.transaction_ref)
            .bind(entry.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::Database)?;

            created.push(row);
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(created)
    }

    pub async fn find_by_pair_id(&self, pair_id: &str) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, pair_id, account, direction, amount_minor, currency, transaction_ref, created_at
            FROM ledger_entries
            WHERE pair_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(pair_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_by_transaction(&self, transaction_ref: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, pair_id, account, direction, amount_minor, currency, transaction_ref, created_at
            FROM ledger_entries
            WHERE transaction_ref = $1
            ORDER BY created_at
            "#,
        )
        .bind(transaction_ref)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_by_account(&self, account: &str, limit: i64, offset: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, pair_id, account, direction, amount_minor, currency, transaction_ref, created_at
            FROM ledger_entries
            WHERE account = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Sums signed entries for an account, used to rebuild
    /// `available_balance` from first principles when the cache is
    /// suspect (§4.1's replay path).
    pub async fn balance_as_of(&self, account: &str, currency: &str, as_of: DateTime<Utc>) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN direction = 'CREDIT' THEN amount_minor ELSE -amount_minor END
            ), 0)
            FROM ledger_entries
            WHERE account = $1 AND currency = $2 AND created_at <= $3
            "#,
        )
        .bind(account)
        .bind(currency)
        .bind(as_of)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    pub async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, pair_id, account, direction, amount_minor, currency, transaction_ref, created_at
            FROM ledger_entries
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// True when a pair_id's persisted entries already balance — used
    /// by replay to short-circuit a duplicate `post` instead of
    /// re-inserting, per the idempotent-post invariant in §4.1.
    pub async fn pair_is_balanced(&self, pair_id: &str) -> Result<bool> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN direction = 'DEBIT' THEN amount_minor ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN direction = 'CREDIT' THEN amount_minor ELSE 0 END), 0)
            FROM ledger_entries
            WHERE pair_id = $1
            "#,
        )
        .bind(pair_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0 == row.1 && row.0 > 0)
    }
}

/// Not persisted directly; kept here so callers can assemble the set
/// shape the repository expects without importing `models` twice.
pub fn direction_sign(direction: EntryDirection) -> i64 {
    direction.sign()
}
