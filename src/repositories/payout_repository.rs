use crate::error::{AppError, Result};
use crate::models::{Payout, PayoutBatch, PayoutStatus};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PayoutRepository {
    pool: PgPool,
}

impl PayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, payout: &Payout) -> Result<Payout> {
        let row = sqlx::query_as::<_, Payout>(
            r#"
            INSERT INTO payouts (
                id, creator_id, method, amount_minor, currency, fees_minor, net_minor,
                status, tax_withholding_minor, batch_id, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, creator_id, method, amount_minor, currency, fees_minor, net_minor,
                status, tax_withholding_minor, batch_id, version, created_at, updated_at
            "#,
        )
        .bind(payout.id)
        .bind(payout.creator_id)
        .bind(payout.method)
        .bind(payout.amount_minor)
        .bind(payout.currency)
        .bind(payout.fees_minor)
        .bind(payout.net_minor)
        .bind(payout.status)
        .bind(payout.tax_withholding_minor)
        .bind(payout.batch_id)
        .bind(payout.version)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Payout>> {
        let row = sqlx::query_as::<_, Payout>(
            r#"
            SELECT id, creator_id, method, amount_minor, currency, fees_minor, net_minor,
                status, tax_withholding_minor, batch_id, version, created_at, updated_at
            FROM payouts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_batch(&self, batch_id: Uuid) -> Result<Vec<Payout>> {
        let rows = sqlx::query_as::<_, Payout>(
            r#"
            SELECT id, creator_id, method, amount_minor, currency, fees_minor, net_minor,
                status, tax_withholding_minor, batch_id, version, created_at, updated_at
            FROM payouts WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn sum_net_by_batch(&self, batch_id: Uuid) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(net_minor), 0) FROM payouts WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.0)
    }

    pub async fn assign_to_batch(&self, payout_id: Uuid, batch_id: Uuid) -> Result<Option<Payout>> {
        let row = sqlx::query_as::<_, Payout>(
            r#"
            UPDATE payouts SET batch_id = $2, status = 'BATCHED', version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING id, creator_id, method, amount_minor, currency, fees_minor, net_minor,
                status, tax_withholding_minor, batch_id, version, created_at, updated_at
            "#,
        )
        .bind(payout_id)
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn update_with_version(&self, payout: &Payout) -> Result<Option<Payout>> {
        let row = sqlx::query_as::<_, Payout>(
            r#"
            UPDATE payouts SET status = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, creator_id, method, amount_minor, currency, fees_minor, net_minor,
                status, tax_withholding_minor, batch_id, version, created_at, updated_at
            "#,
        )
        .bind(payout.id)
        .bind(payout.version - 1)
        .bind(payout.status)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_pending(&self, limit: i64) -> Result<Vec<Payout>> {
        let rows = sqlx::query_as::<_, Payout>(
            r#"
            SELECT id, creator_id, method, amount_minor, currency, fees_minor, net_minor,
                status, tax_withholding_minor, batch_id, version, created_at, updated_at
            FROM payouts WHERE status = $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(PayoutStatus::Pending)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}

pub struct PayoutBatchRepository {
    pool: PgPool,
}

impl PayoutBatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, batch: &PayoutBatch) -> Result<PayoutBatch> {
        let row = sqlx::query_as::<_, PayoutBatch>(
            r#"
            INSERT INTO payout_batches (id, currency, status, payout_count, net_minor, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, currency, status, payout_count, net_minor, version, created_at, updated_at
            "#,
        )
        .bind(batch.id)
        .bind(batch.currency)
        .bind(batch.status)
        .bind(batch.payout_count)
        .bind(batch.net_minor)
        .bind(batch.version)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_open(&self, currency: crate::models::Currency) -> Result<Option<PayoutBatch>> {
        let row = sqlx::query_as::<_, PayoutBatch>(
            r#"
            SELECT id, currency, status, payout_count, net_minor, version, created_at, updated_at
            FROM payout_batches WHERE currency = $1 AND status = 'OPEN'
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(currency)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PayoutBatch>> {
        let row = sqlx::query_as::<_, PayoutBatch>(
            r#"
            SELECT id, currency, status, payout_count, net_minor, version, created_at, updated_at
            FROM payout_batches WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn update_with_version(&self, batch: &PayoutBatch) -> Result<Option<PayoutBatch>> {
        let row = sqlx::query_as::<_, PayoutBatch>(
            r#"
            UPDATE payout_batches
            SET status = $3, payout_count = $4, net_minor = $5, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, currency, status, payout_count, net_minor, version, created_at, updated_at
            "#,
        )
        .bind(batch.id)
        .bind(batch.version - 1)
        .bind(batch.status)
        .bind(batch.payout_count)
        .bind(batch.net_minor)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
