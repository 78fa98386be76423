use crate::error::{AppError, Result};
use crate::models::{AccountBalance, Currency};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for the creator balance cache (§4.1). Rows here are a
/// derived projection of the Ledger, not a source of truth; every
/// mutator is an atomic `UPDATE ... RETURNING` guarded by the
/// invariant it enforces, mirroring the repository's own
/// optimistic-locking convention.
pub struct BalanceRepository {
    pool: PgPool,
}

impl BalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, balance: &AccountBalance) -> Result<AccountBalance> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            INSERT INTO creator_balances (creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            "#,
        )
        .bind(balance.creator_id)
        .bind(balance.currency)
        .bind(balance.available_minor)
        .bind(balance.pending_minor)
        .bind(balance.reserved_minor)
        .bind(balance.version)
        .bind(balance.last_updated)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_creator_and_currency(
        &self,
        creator_id: Uuid,
        currency: Currency,
    ) -> Result<Option<AccountBalance>> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            SELECT creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            FROM creator_balances
            WHERE creator_id = $1 AND currency = $2
            "#,
        )
        .bind(creator_id)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn get_or_create(&self, creator_id: Uuid, currency: Currency) -> Result<AccountBalance> {
        if let Some(balance) = self.find_by_creator_and_currency(creator_id, currency).await? {
            return Ok(balance);
        }
        self.create(&AccountBalance::new(creator_id, currency, Utc::now())).await
    }

    pub async fn credit(&self, creator_id: Uuid, currency: Currency, amount_minor: i64) -> Result<AccountBalance> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            UPDATE creator_balances
            SET available_minor = available_minor + $3,
                version = version + 1,
                last_updated = NOW()
            WHERE creator_id = $1 AND currency = $2
            RETURNING creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            "#,
        )
        .bind(creator_id)
        .bind(currency)
        .bind(amount_minor)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Debits the usable balance (`available - reserved`). Fails closed
    /// when the invariant would go negative rather than raising after
    /// the fact.
    pub async fn debit(&self, creator_id: Uuid, currency: Currency, amount_minor: i64) -> Result<AccountBalance> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            UPDATE creator_balances
            SET available_minor = available_minor - $3,
                version = version + 1,
                last_updated = NOW()
            WHERE creator_id = $1 AND currency = $2
              AND available_minor - reserved_minor >= $3
            RETURNING creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            "#,
        )
        .bind(creator_id)
        .bind(currency)
        .bind(amount_minor)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::Validation("insufficient funds or balance not found".to_string()))
    }

    pub async fn reserve(&self, creator_id: Uuid, currency: Currency, amount_minor: i64) -> Result<AccountBalance> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            UPDATE creator_balances
            SET available_minor = available_minor - $3,
                reserved_minor = reserved_minor + $3,
                version = version + 1,
                last_updated = NOW()
            WHERE creator_id = $1 AND currency = $2 AND available_minor >= $3
            RETURNING creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            "#,
        )
        .bind(creator_id)
        .bind(currency)
        .bind(amount_minor)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::Validation("insufficient funds for reservation".to_string()))
    }

    pub async fn release_reservation(&self, creator_id: Uuid, currency: Currency, amount_minor: i64) -> Result<AccountBalance> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            UPDATE creator_balances
            SET available_minor = available_minor + LEAST($3, reserved_minor),
                reserved_minor = reserved_minor - LEAST($3, reserved_minor),
                version = version + 1,
                last_updated = NOW()
            WHERE creator_id = $1 AND currency = $2
            RETURNING creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            "#,
        )
        .bind(creator_id)
        .bind(currency)
        .bind(amount_minor)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn move_to_pending(&self, creator_id: Uuid, currency: Currency, amount_minor: i64) -> Result<AccountBalance> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            UPDATE creator_balances
            SET available_minor = available_minor - $3,
                pending_minor = pending_minor + $3,
                version = version + 1,
                last_updated = NOW()
            WHERE creator_id = $1 AND currency = $2 AND available_minor >= $3
            RETURNING creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            "#,
        )
        .bind(creator_id)
        .bind(currency)
        .bind(amount_minor)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::Validation("insufficient funds to move to pending".to_string()))
    }

    pub async fn settle_pending(&self, creator_id: Uuid, currency: Currency, amount_minor: i64) -> Result<AccountBalance> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            UPDATE creator_balances
            SET pending_minor = pending_minor - LEAST($3, pending_minor),
                available_minor = available_minor + LEAST($3, pending_minor),
                version = version + 1,
                last_updated = NOW()
            WHERE creator_id = $1 AND currency = $2
            RETURNING creator_id, currency, available_minor, pending_minor, reserved_minor, version, last_updated
            "#,
        )
        .bind(creator_id)
        .bind(currency)
        .bind(amount_minor)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
