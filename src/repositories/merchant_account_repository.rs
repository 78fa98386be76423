use crate::error::{AppError, Result};
use crate::models::MerchantAccount;
use sqlx::PgPool;
use uuid::Uuid;

pub struct MerchantAccountRepository {
    pool: PgPool,
}

impl MerchantAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, account: &MerchantAccount) -> Result<MerchantAccount> {
        let row = sqlx::query_as::<_, MerchantAccount>(
            r#"
            INSERT INTO merchant_accounts (
                id, processor_id, mid, region, descriptor, currency,
                daily_volume_cap_minor, monthly_volume_cap_minor, min_amount_minor, max_amount_minor,
                risk_profile, platform_allowlist, kill_switch, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id, processor_id, mid, region, descriptor, currency,
                daily_volume_cap_minor, monthly_volume_cap_minor, min_amount_minor, max_amount_minor,
                risk_profile, platform_allowlist, kill_switch, version, created_at, updated_at
            "#,
        )
        .bind(account.id)
        .bind(&account.processor_id)
        .bind(&account.mid)
        .bind(&account.region)
        .bind(&account.descriptor)
        .bind(account.currency)
        .bind(account.daily_volume_cap_minor)
        .bind(account.monthly_volume_cap_minor)
        .bind(account.min_amount_minor)
        .bind(account.max_amount_minor)
        .bind(&account.risk_profile)
        .bind(&account.platform_allowlist)
        .bind(account.kill_switch)
        .bind(account.version)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<MerchantAccount>> {
        let row = sqlx::query_as::<_, MerchantAccount>(
            r#"
            SELECT id, processor_id, mid, region, descriptor, currency,
                daily_volume_cap_minor, monthly_volume_cap_minor, min_amount_minor, max_amount_minor,
                risk_profile, platform_allowlist, kill_switch, version, created_at, updated_at
            FROM merchant_accounts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Loads every non-kill-switched account, used to rebuild the
    /// `arc-swap` snapshot consumed by the router (§5).
    pub async fn find_all_active(&self) -> Result<Vec<MerchantAccount>> {
        let rows = sqlx::query_as::<_, MerchantAccount>(
            r#"
            SELECT id, processor_id, mid, region, descriptor, currency,
                daily_volume_cap_minor, monthly_volume_cap_minor, min_amount_minor, max_amount_minor,
                risk_profile, platform_allowlist, kill_switch, version, created_at, updated_at
            FROM merchant_accounts WHERE kill_switch = false
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Looks an account up by its processor-facing MID, used by the
    /// orchestrator to resolve a routing rule's fallback chain (§4.6)
    /// without rebuilding the router's whole snapshot.
    pub async fn find_by_mid(&self, mid: &str) -> Result<Option<MerchantAccount>> {
        let row = sqlx::query_as::<_, MerchantAccount>(
            r#"
            SELECT id, processor_id, mid, region, descriptor, currency,
                daily_volume_cap_minor, monthly_volume_cap_minor, min_amount_minor, max_amount_minor,
                risk_profile, platform_allowlist, kill_switch, version, created_at, updated_at
            FROM merchant_accounts WHERE mid = $1 AND kill_switch = false
            "#,
        )
        .bind(mid)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn set_kill_switch(&self, id: Uuid, engaged: bool) -> Result<Option<MerchantAccount>> {
        let row = sqlx::query_as::<_, MerchantAccount>(
            r#"
            UPDATE merchant_accounts SET kill_switch = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING id, processor_id, mid, region, descriptor, currency,
                daily_volume_cap_minor, monthly_volume_cap_minor, min_amount_minor, max_amount_minor,
                risk_profile, platform_allowlist, kill_switch, version, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(engaged)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
