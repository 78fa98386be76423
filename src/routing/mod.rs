//! Routing engine (§4.2): picks the merchant account a transaction
//! authorizes against. Rules are loaded into an immutable
//! `arc-swap`-backed snapshot so the hot path never takes a lock or
//! touches the database; refreshing the snapshot (on a timer or an
//! explicit invalidation event) swaps in a new `Arc` atomically.

pub mod limits;

use crate::error::{AppError, Result};
use crate::models::{MerchantAccount, RoutingContext, RoutingRule};
use crate::repositories::{MerchantAccountRepository, RoutingRuleRepository};
use arc_swap::ArcSwap;
use chrono::Utc;
use limits::VolumeTracker;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The outcome of a routing decision: a primary MID to authorize
/// against, plus the ordered fallback chain the orchestrator works
/// through on a `RetriableDecline` (§4.6).
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub rule_id: Option<Uuid>,
    pub merchant_account: MerchantAccount,
    pub fallback_mids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct RoutingSnapshot {
    rules: Vec<RoutingRule>,
    accounts_by_mid: HashMap<String, MerchantAccount>,
}

pub struct Router {
    snapshot: ArcSwap<RoutingSnapshot>,
    rule_repository: RoutingRuleRepository,
    account_repository: MerchantAccountRepository,
    limits: VolumeTracker,
    default_primary_mid: String,
}

impl Router {
    pub fn new(
        rule_repository: RoutingRuleRepository,
        account_repository: MerchantAccountRepository,
        default_primary_mid: String,
    ) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RoutingSnapshot::default()),
            rule_repository,
            account_repository,
            limits: VolumeTracker::new(),
            default_primary_mid,
        }
    }

    /// Reloads the routing rule set and merchant account roster from
    /// the database and atomically swaps them into the live snapshot.
    /// Called once at startup and on a periodic timer
    /// (`router.snapshot_refresh_secs`).
    pub async fn refresh(&self) -> Result<()> {
        let rules = self.rule_repository.find_all_active_ordered().await?;
        let accounts = self.account_repository.find_all_active().await?;
        let accounts_by_mid = accounts.into_iter().map(|a| (a.mid.clone(), a)).collect();
        self.snapshot.store(Arc::new(RoutingSnapshot { rules, accounts_by_mid }));
        Ok(())
    }

    /// Resolves a routing decision for `ctx`. Rules are evaluated in
    /// ascending priority order; the first whose conditions match and
    /// whose resolved MID passes hard constraints and has volume
    /// headroom wins. No matching rule falls back to
    /// `router.default_primary_mid`, which must itself pass hard
    /// constraints or routing fails outright.
    pub fn route(&self, ctx: &RoutingContext) -> Result<RoutingDecision> {
        let snapshot = self.snapshot.load();

        for rule in snapshot.rules.iter() {
            if !rule.matches(ctx) {
                continue;
            }
            let mid = rule.resolve_primary(ctx.fan_id, ctx.platform);
            if let Some(account) = self.eligible_account(&snapshot, mid, ctx) {
                return Ok(RoutingDecision {
                    rule_id: Some(rule.id),
                    merchant_account: account,
                    fallback_mids: rule.target.fallback_mids.clone(),
                });
            }
        }

        if let Some(account) = self.eligible_account(&snapshot, &self.default_primary_mid, ctx) {
            return Ok(RoutingDecision { rule_id: None, merchant_account: account, fallback_mids: Vec::new() });
        }

        Err(AppError::NotFound(format!(
            "no merchant account available for platform={} currency={} amount={}",
            ctx.platform, ctx.currency, ctx.amount_minor
        )))
    }

    fn eligible_account(
        &self,
        snapshot: &RoutingSnapshot,
        mid: &str,
        ctx: &RoutingContext,
    ) -> Option<MerchantAccount> {
        let account = snapshot.accounts_by_mid.get(mid)?;
        if !account.passes_hard_constraints(ctx.currency, ctx.amount_minor, ctx.platform) {
            return None;
        }
        let now = Utc::now();
        if !self.limits.has_headroom(
            account.id,
            ctx.amount_minor,
            account.daily_volume_cap_minor,
            account.monthly_volume_cap_minor,
            now,
        ) {
            return None;
        }
        Some(account.clone())
    }

    /// Records a committed charge against the rolling volume counters;
    /// called by the orchestrator once authorization actually goes out
    /// over the selected MID.
    pub fn record_volume(&self, merchant_account_id: Uuid, amount_minor: i64) {
        self.limits.record(merchant_account_id, amount_minor, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;

    fn account(mid: &str) -> MerchantAccount {
        MerchantAccount {
            id: Uuid::new_v4(),
            processor_id: "ccbill".into(),
            mid: mid.to_string(),
            region: "US".into(),
            descriptor: "FANZ*CREATOR".into(),
            currency: Currency::USD,
            daily_volume_cap_minor: 1_000_000_00,
            monthly_volume_cap_minor: 10_000_000_00,
            min_amount_minor: 100,
            max_amount_minor: 50_000,
            risk_profile: "standard".into(),
            platform_allowlist: Vec::new(),
            kill_switch: false,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ctx(fan_id: Uuid) -> RoutingContext<'static> {
        RoutingContext {
            platform: "P1",
            region: "US",
            currency: Currency::USD,
            method_kind: "card",
            amount_minor: 1000,
            trust_score: 85,
            bin: Some("411111"),
            at: Utc::now(),
            user_tags: &[],
            fan_id,
        }
    }

    #[test]
    fn falls_back_to_default_mid_with_no_matching_rule() {
        let mut accounts_by_mid = HashMap::new();
        accounts_by_mid.insert("default".to_string(), account("default"));
        let snapshot = RoutingSnapshot { rules: Vec::new(), accounts_by_mid };

        // `route` never touches the repositories (only `refresh` does),
        // so a lazily-connecting pool is enough to stand one up here.
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction never touches the network");
        let router = Router {
            snapshot: ArcSwap::from_pointee(snapshot),
            rule_repository: RoutingRuleRepository::new(pool.clone()),
            account_repository: MerchantAccountRepository::new(pool),
            limits: VolumeTracker::new(),
            default_primary_mid: "default".to_string(),
        };

        let decision = router.route(&ctx(Uuid::new_v4())).unwrap();
        assert_eq!(decision.merchant_account.mid, "default");
        assert!(decision.rule_id.is_none());
    }
}
