use crate::error::{AppError, Result};
use crate::models::{Dispute, Refund};
use sqlx::PgPool;
use uuid::Uuid;

pub struct RefundRepository {
    pool: PgPool,
}

impl RefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, refund: &Refund) -> Result<Refund> {
        let row = sqlx::query_as::<_, Refund>(
            r#"
            INSERT INTO refunds (id, transaction_id, amount_minor, currency, status, reason, decision_source, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, transaction_id, amount_minor, currency, status, reason, decision_source, version, created_at, updated_at
            "#,
        )
        .bind(refund.id)
        .bind(refund.transaction_id)
        .bind(refund.amount_minor)
        .bind(refund.currency)
        .bind(refund.status)
        .bind(&refund.reason)
        .bind(refund.decision_source)
        .bind(refund.version)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>> {
        let row = sqlx::query_as::<_, Refund>(
            r#"
            SELECT id, transaction_id, amount_minor, currency, status, reason, decision_source, version, created_at, updated_at
            FROM refunds WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_transaction(&self, transaction_id: Uuid) -> Result<Vec<Refund>> {
        let rows = sqlx::query_as::<_, Refund>(
            r#"
            SELECT id, transaction_id, amount_minor, currency, status, reason, decision_source, version, created_at, updated_at
            FROM refunds WHERE transaction_id = $1 ORDER BY created_at
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn update_with_version(&self, refund: &Refund) -> Result<Option<Refund>> {
        let row = sqlx::query_as::<_, Refund>(
            r#"
            UPDATE refunds SET status = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, transaction_id, amount_minor, currency, status, reason, decision_source, version, created_at, updated_at
            "#,
        )
        .bind(refund.id)
        .bind(refund.version - 1)
        .bind(refund.status)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}

pub struct DisputeRepository {
    pool: PgPool,
}

impl DisputeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, dispute: &Dispute) -> Result<Dispute> {
        let row = sqlx::query_as::<_, Dispute>(
            r#"
            INSERT INTO disputes (id, transaction_id, dispute_type, stage, deadline_at, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, transaction_id, dispute_type, stage, deadline_at, version, created_at, updated_at
            "#,
        )
        .bind(dispute.id)
        .bind(dispute.transaction_id)
        .bind(dispute.dispute_type)
        .bind(dispute.stage)
        .bind(dispute.deadline_at)
        .bind(dispute.version)
        .bind(dispute.created_at)
        .bind(dispute.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Dispute>> {
        let row = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT id, transaction_id, dispute_type, stage, deadline_at, version, created_at, updated_at
            FROM disputes WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_past_deadline(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Dispute>> {
        let rows = sqlx::query_as::<_, Dispute>(
            r#"
            SELECT id, transaction_id, dispute_type, stage, deadline_at, version, created_at, updated_at
            FROM disputes
            WHERE deadline_at <= $1 AND stage != 'CLOSED'
            ORDER BY deadline_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn update_with_version(&self, dispute: &Dispute) -> Result<Option<Dispute>> {
        let row = sqlx::query_as::<_, Dispute>(
            r#"
            UPDATE disputes SET stage = $3, deadline_at = $4, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, transaction_id, dispute_type, stage, deadline_at, version, created_at, updated_at
            "#,
        )
        .bind(dispute.id)
        .bind(dispute.version - 1)
        .bind(dispute.stage)
        .bind(dispute.deadline_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
