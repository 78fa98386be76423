use super::currency::Currency;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Conditions a request must satisfy for a rule to match. Every field
/// is optional; an absent field imposes no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConditions {
    pub platforms: Option<Vec<String>>,
    pub regions: Option<Vec<String>>,
    pub currencies: Option<Vec<Currency>>,
    pub methods: Option<Vec<String>>,
    pub amount_min_minor: Option<i64>,
    pub amount_max_minor: Option<i64>,
    pub trust_score_min: Option<i16>,
    pub trust_score_max: Option<i16>,
    pub bin_ranges: Option<Vec<(String, String)>>,
    pub time_window: Option<(NaiveTime, NaiveTime)>,
    pub user_tags: Option<Vec<String>>,
}

/// Context a `RoutingRule` evaluates its conditions against.
#[derive(Debug, Clone)]
pub struct RoutingContext<'a> {
    pub platform: &'a str,
    pub region: &'a str,
    pub currency: Currency,
    pub method_kind: &'a str,
    pub amount_minor: i64,
    pub trust_score: i16,
    pub bin: Option<&'a str>,
    pub at: DateTime<Utc>,
    pub user_tags: &'a [String],
    pub fan_id: Uuid,
}

impl RoutingConditions {
    pub fn matches(&self, ctx: &RoutingContext) -> bool {
        if let Some(ref platforms) = self.platforms {
            if !platforms.iter().any(|p| p == ctx.platform) {
                return false;
            }
        }
        if let Some(ref regions) = self.regions {
            if !regions.iter().any(|r| r == ctx.region) {
                return false;
            }
        }
        if let Some(ref currencies) = self.currencies {
            if !currencies.contains(&ctx.currency) {
                return false;
            }
        }
        if let Some(ref methods) = self.methods {
            if !methods.iter().any(|m| m == ctx.method_kind) {
                return false;
            }
        }
        if let Some(min) = self.amount_min_minor {
            if ctx.amount_minor < min {
                return false;
            }
        }
        if let Some(max) = self.amount_max_minor {
            if ctx.amount_minor >= max {
                return false;
            }
        }
        if let Some(min) = self.trust_score_min {
            if ctx.trust_score < min {
                return false;
            }
        }
        if let Some(max) = self.trust_score_max {
            if ctx.trust_score > max {
                return false;
            }
        }
        if let Some(ref ranges) = self.bin_ranges {
            let Some(bin) = ctx.bin else { return false };
            if !ranges.iter().any(|(lo, hi)| bin >= lo.as_str() && bin <= hi.as_str()) {
                return false;
            }
        }
        if let Some((start, end)) = self.time_window {
            let t = ctx.at.time();
            let in_window = if start <= end { t >= start && t < end } else { t >= start || t < end };
            if !in_window {
                return false;
            }
        }
        if let Some(ref tags) = self.user_tags {
            if !tags.iter().any(|t| ctx.user_tags.contains(t)) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTarget {
    pub primary_mid: String,
    pub fallback_mids: Vec<String>,
    pub split_percentage: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryConfig {
    pub enabled: bool,
    pub percentage: u8,
    pub platforms: Vec<String>,
    pub canary_mid: String,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self { enabled: false, percentage: 0, platforms: Vec::new(), canary_mid: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoutingRule {
    pub id: Uuid,
    pub priority: i32,
    pub active: bool,
    #[sqlx(json)]
    pub conditions: sqlx::types::Json<RoutingConditions>,
    #[sqlx(json)]
    pub target: sqlx::types::Json<RoutingTarget>,
    #[sqlx(json)]
    pub canary: sqlx::types::Json<CanaryConfig>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoutingRule {
    /// Deterministic FNV-1a-based canary hash, per the open question
    /// resolved in the full spec: `hash(fan_id || rule_id) % 100`.
    pub fn canary_hash(fan_id: Uuid, rule_id: Uuid) -> u8 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in fan_id.as_bytes().iter().chain(rule_id.as_bytes().iter()) {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % 100) as u8
    }

    pub fn matches(&self, ctx: &RoutingContext) -> bool {
        self.active && self.conditions.matches(ctx)
    }

    /// Resolves the MID this rule sends the request to: the canary
    /// target when canary is enabled, the request's platform is in
    /// the canary platform set (or the set is empty, meaning "all
    /// platforms"), and the hash lands under the configured
    /// percentage; the primary MID otherwise.
    pub fn resolve_primary(&self, fan_id: Uuid, platform: &str) -> &str {
        let canary = &self.canary;
        let platform_eligible = canary.platforms.is_empty() || canary.platforms.iter().any(|p| p == platform);
        if canary.enabled
            && platform_eligible
            && RoutingRule::canary_hash(fan_id, self.id) < canary.percentage
        {
            &canary.canary_mid
        } else {
            &self.target.primary_mid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(fan_id: Uuid) -> RoutingContext<'a> {
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
    fn amount_range_is_lower_inclusive_upper_exclusive() {
        let mut cond = RoutingConditions::default();
        cond.amount_min_minor = Some(1000);
        cond.amount_max_minor = Some(2000);

        let mut request = ctx(Uuid::new_v4());
        request.amount_minor = 1000;
        assert!(cond.matches(&request));

        request.amount_minor = 2000;
        assert!(!cond.matches(&request));
    }

    #[test]
    fn canary_hash_is_deterministic_for_same_ids() {
        let fan_id = Uuid::new_v4();
        let rule_id = Uuid::new_v4();
        assert_eq!(RoutingRule::canary_hash(fan_id, rule_id), RoutingRule::canary_hash(fan_id, rule_id));
    }

    #[test]
    fn missing_bin_fails_bin_range_condition() {
        let mut cond = RoutingConditions::default();
        cond.bin_ranges = Some(vec![("400000".to_string(), "499999".to_string())]);
        let mut request = ctx(Uuid::new_v4());
        request.bin = None;
        assert!(!cond.matches(&request));
    }
}
