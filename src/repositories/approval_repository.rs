use crate::error::{AppError, Result};
use crate::models::Approval;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct ApprovalRepository {
    pool: PgPool,
}

impl ApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, approval: &Approval) -> Result<Approval> {
        let row = sqlx::query_as::<_, Approval>(
            r#"
            INSERT INTO approvals (
                id, entity_ref, approval_type, state, priority, assignee, sla_minutes, sla_at,
                history, decision, decision_reason, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id, entity_ref, approval_type, state, priority, assignee, sla_minutes, sla_at,
                history, decision, decision_reason, version, created_at, updated_at
            "#,
        )
        .bind(approval.id)
        .bind(approval.entity_ref)
        .bind(approval.approval_type)
        .bind(approval.state)
        .bind(approval.priority)
        .bind(&approval.assignee)
        .bind(approval.sla_minutes)
        .bind(approval.sla_at)
        .bind(&approval.history)
        .bind(&approval.decision)
        .bind(&approval.decision_reason)
        .bind(approval.version)
        .bind(approval.created_at)
        .bind(approval.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Approval>> {
        let row = sqlx::query_as::<_, Approval>(
            r#"
            SELECT id, entity_ref, approval_type, state, priority, assignee, sla_minutes, sla_at,
                history, decision, decision_reason, version, created_at, updated_at
            FROM approvals WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Queue view ordered by priority then SLA urgency, for the
    /// review UI and for the sweeper that escalates past-SLA entries.
    pub async fn find_pending_ordered(&self, limit: i64) -> Result<Vec<Approval>> {
        let rows = sqlx::query_as::<_, Approval>(
            r#"
            SELECT id, entity_ref, approval_type, state, priority, assignee, sla_minutes, sla_at,
                history, decision, decision_reason, version, created_at, updated_at
            FROM approvals
            WHERE state = 'PENDING'
            ORDER BY priority DESC, sla_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_past_sla(&self, now: DateTime<Utc>) -> Result<Vec<Approval>> {
        let rows = sqlx::query_as::<_, Approval>(
            r#"
            SELECT id, entity_ref, approval_type, state, priority, assignee, sla_minutes, sla_at,
                history, decision, decision_reason, version, created_at, updated_at
            FROM approvals
            WHERE state = 'PENDING' AND sla_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Optimistic update guarded by `version`; the handler that enforces
    /// single-decision semantics relies on this returning `None` when a
    /// concurrent decision already landed.
    pub async fn update_with_version(&self, approval: &Approval) -> Result<Option<Approval>> {
        let row = sqlx::query_as::<_, Approval>(
            r#"
            UPDATE approvals
            SET state = $3, assignee = $4, history = $5, decision = $6, decision_reason = $7,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, entity_ref, approval_type, state, priority, assignee, sla_minutes, sla_at,
                history, decision, decision_reason, version, created_at, updated_at
            "#,
        )
        .bind(approval.id)
        .bind(approval.version - 1)
        .bind(approval.state)
        .bind(&approval.assignee)
        .bind(&approval.history)
        .bind(&approval.decision)
        .bind(&approval.decision_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
