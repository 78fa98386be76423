use crate::error::{AppError, Result};
use crate::models::RoutingRule;
use sqlx::PgPool;
use uuid::Uuid;

pub struct RoutingRuleRepository {
    pool: PgPool,
}

impl RoutingRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, rule: &RoutingRule) -> Result<RoutingRule> {
        let row = sqlx::query_as::<_, RoutingRule>(
            r#"
            INSERT INTO routing_rules (id, priority, active, conditions, target, canary, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, priority, active, conditions, target, canary, version, created_at, updated_at
            "#,
        )
        .bind(rule.id)
        .bind(rule.priority)
        .bind(rule.active)
        .bind(&rule.conditions)
        .bind(&rule.target)
        .bind(&rule.canary)
        .bind(rule.version)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Loaded once at startup and on every invalidation event to
    /// rebuild the `arc-swap` routing snapshot (§5); ordering by
    /// priority ascending matches the router's first-match contract.
    pub async fn find_all_active_ordered(&self) -> Result<Vec<RoutingRule>> {
        let rows = sqlx::query_as::<_, RoutingRule>(
            r#"
            SELECT id, priority, active, conditions, target, canary, version, created_at, updated_at
            FROM routing_rules
            WHERE active = true
            ORDER BY priority ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RoutingRule>> {
        let row = sqlx::query_as::<_, RoutingRule>(
            r#"
            SELECT id, priority, active, conditions, target, canary, version, created_at, updated_at
            FROM routing_rules WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
