use crate::error::{AppError, Result};
use crate::models::{Transaction, TransactionEvent, TransactionStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for `Transaction` aggregate rows and their append-only
/// event log.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, txn: &Transaction) -> Result<Transaction> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                id, fan_id, creator_id, platform, amount_minor, currency, fees_minor,
                processor_id, merchant_account_id, status, trust_score, risk_flags,
                processor_response, refunded_total_minor, version,
                initiated_at, authorized_at, captured_at, failed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING id, fan_id, creator_id, platform, amount_minor, currency, fees_minor,
                processor_id, merchant_account_id, status, trust_score, risk_flags,
                processor_response, refunded_total_minor, version,
                initiated_at, authorized_at, captured_at, failed_at, created_at, updated_at
            "#,
        )
        .bind(txn.id)
        .bind(txn.fan_id)
        .bind(txn.creator_id)
        .bind(&txn.platform)
        .bind(txn.amount_minor)
        .bind(txn.currency)
        .bind(txn.fees_minor)
        .bind(&txn.processor_id)
        .bind(txn.merchant_account_id)
        .bind(txn.status)
        .bind(txn.trust_score)
        .bind(&txn.risk_flags)
        .bind(&txn.processor_response)
        .bind(txn.refunded_total_minor)
        .bind(txn.version)
        .bind(txn.initiated_at)
        .bind(txn.authorized_at)
        .bind(txn.captured_at)
        .bind(txn.failed_at)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, fan_id, creator_id, platform, amount_minor, currency, fees_minor,
                processor_id, merchant_account_id, status, trust_score, risk_flags,
                processor_response, refunded_total_minor, version,
                initiated_at, authorized_at, captured_at, failed_at, created_at, updated_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_fan(&self, fan_id: Uuid, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, fan_id, creator_id, platform, amount_minor, currency, fees_minor,
                processor_id, merchant_account_id, status, trust_score, risk_flags,
                processor_response, refunded_total_minor, version,
                initiated_at, authorized_at, captured_at, failed_at, created_at, updated_at
            FROM transactions
            WHERE fan_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(fan_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Optimistic-locked transition: only succeeds if `version` still
    /// matches what the caller read, so a concurrent writer loses the
    /// race instead of silently clobbering a transition.
    pub async fn update_with_version(&self, txn: &Transaction) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $3, trust_score = $4, risk_flags = $5, processor_response = $6,
                refunded_total_minor = $7, version = version + 1,
                authorized_at = $8, captured_at = $9, failed_at = $10, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, fan_id, creator_id, platform, amount_minor, currency, fees_minor,
                processor_id, merchant_account_id, status, trust_score, risk_flags,
                processor_response, refunded_total_minor, version,
                initiated_at, authorized_at, captured_at, failed_at, created_at, updated_at
            "#,
        )
        .bind(txn.id)
        .bind(txn.version - 1)
        .bind(txn.status)
        .bind(txn.trust_score)
        .bind(&txn.risk_flags)
        .bind(&txn.processor_response)
        .bind(txn.refunded_total_minor)
        .bind(txn.authorized_at)
        .bind(txn.captured_at)
        .bind(txn.failed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn append_event(&self, event: &TransactionEvent) -> Result<TransactionEvent> {
        let row = sqlx::query_as::<_, TransactionEvent>(
            r#"
            INSERT INTO transaction_events (id, transaction_id, event_kind, event_source, amount_delta_minor, processor_event_id, success, error_code, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, transaction_id, event_kind, event_source, amount_delta_minor, processor_event_id, success, error_code, created_at
            "#,
        )
        .bind(event.id)
        .bind(event.transaction_id)
        .bind(&event.event_kind)
        .bind(&event.event_source)
        .bind(event.amount_delta_minor)
        .bind(&event.processor_event_id)
        .bind(event.success)
        .bind(&event.error_code)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_events(&self, transaction_id: Uuid) -> Result<Vec<TransactionEvent>> {
        let rows = sqlx::query_as::<_, TransactionEvent>(
            r#"
            SELECT id, transaction_id, event_kind, event_source, amount_delta_minor, processor_event_id, success, error_code, created_at
            FROM transaction_events
            WHERE transaction_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Looks a transaction up by a processor's own reference for a
    /// prior call against it, used by settlement-line matching (§4.8)
    /// where the settlement file only carries the processor's id.
    pub async fn find_by_processor_event_id(&self, processor_event_id: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.id, t.fan_id, t.creator_id, t.platform, t.amount_minor, t.currency, t.fees_minor,
                t.processor_id, t.merchant_account_id, t.status, t.trust_score, t.risk_flags,
                t.processor_response, t.refunded_total_minor, t.version,
                t.initiated_at, t.authorized_at, t.captured_at, t.failed_at, t.created_at, t.updated_at
            FROM transactions t
            JOIN transaction_events e ON e.transaction_id = t.id
            WHERE e.processor_event_id = $1
            ORDER BY e.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(processor_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_status(&self, status: TransactionStatus, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, fan_id, creator_id, platform, amount_minor, currency, fees_minor,
                processor_id, merchant_account_id, status, trust_score, risk_flags,
                processor_response, refunded_total_minor, version,
                initiated_at, authorized_at, captured_at, failed_at, created_at, updated_at
            FROM transactions
            WHERE status = $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
