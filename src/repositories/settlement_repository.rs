use crate::error::{AppError, Result};
use crate::models::Settlement;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct SettlementRepository {
    pool: PgPool,
}

impl SettlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, settlement: &Settlement) -> Result<Settlement> {
        let row = sqlx::query_as::<_, Settlement>(
            r#"
            INSERT INTO settlements (
                id, processor_id, batch_window_start, batch_window_end, currency,
                gross_minor, fees_minor, chargebacks_minor, refunds_minor, net_minor,
                discrepancies, reconciled, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id, processor_id, batch_window_start, batch_window_end, currency,
                gross_minor, fees_minor, chargebacks_minor, refunds_minor, net_minor,
                discrepancies, reconciled, version, created_at, updated_at
            "#,
        )
        .bind(settlement.id)
        .bind(&settlement.processor_id)
        .bind(settlement.batch_window_start)
        .bind(settlement.batch_window_end)
        .bind(settlement.currency)
        .bind(settlement.gross_minor)
        .bind(settlement.fees_minor)
        .bind(settlement.chargebacks_minor)
        .bind(settlement.refunds_minor)
        .bind(settlement.net_minor)
        .bind(&settlement.discrepancies)
        .bind(settlement.reconciled)
        .bind(settlement.version)
        .bind(settlement.created_at)
        .bind(settlement.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Settlement>> {
        let row = sqlx::query_as::<_, Settlement>(
            r#"
            SELECT id, processor_id, batch_window_start, batch_window_end, currency,
                gross_minor, fees_minor, chargebacks_minor, refunds_minor, net_minor,
                discrepancies, reconciled, version, created_at, updated_at
            FROM settlements WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_unreconciled(&self, processor_id: &str) -> Result<Vec<Settlement>> {
        let rows = sqlx::query_as::<_, Settlement>(
            r#"
            SELECT id, processor_id, batch_window_start, batch_window_end, currency,
                gross_minor, fees_minor, chargebacks_minor, refunds_minor, net_minor,
                discrepancies, reconciled, version, created_at, updated_at
            FROM settlements
            WHERE processor_id = $1 AND reconciled = false
            ORDER BY batch_window_start
            "#,
        )
        .bind(processor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn seal(&self, settlement: &Settlement) -> Result<Option<Settlement>> {
        let row = sqlx::query_as::<_, Settlement>(
            r#"
            UPDATE settlements
            SET discrepancies = $3, reconciled = true, gross_minor = $4, fees_minor = $5,
                chargebacks_minor = $6, refunds_minor = $7, net_minor = $8,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, processor_id, batch_window_start, batch_window_end, currency,
                gross_minor, fees_minor, chargebacks_minor, refunds_minor, net_minor,
                discrepancies, reconciled, version, created_at, updated_at
            "#,
        )
        .bind(settlement.id)
        .bind(settlement.version - 1)
        .bind(&settlement.discrepancies)
        .bind(settlement.gross_minor)
        .bind(settlement.fees_minor)
        .bind(settlement.chargebacks_minor)
        .bind(settlement.refunds_minor)
        .bind(settlement.net_minor)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_window(
        &self,
        processor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Settlement>> {
        let row = sqlx::query_as::<_, Settlement>(
            r#"
            SELECT id, processor_id, batch_window_start, batch_window_end, currency,
                gross_minor, fees_minor, chargebacks_minor, refunds_minor, net_minor,
                discrepancies, reconciled, version, created_at, updated_at
            FROM settlements
            WHERE processor_id = $1 AND batch_window_start = $2 AND batch_window_end = $3
            "#,
        )
        .bind(processor_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
