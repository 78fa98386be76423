use super::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The unit of routing selection: one merchant account at one
/// processor. `kill_switch` lets operations pull a MID out of
/// rotation without deactivating the whole processor.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MerchantAccount {
    pub id: Uuid,
    pub processor_id: String,
    pub mid: String,
    pub region: String,
    pub descriptor: String,
    pub currency: Currency,
    pub daily_volume_cap_minor: i64,
    pub monthly_volume_cap_minor: i64,
    pub min_amount_minor: i64,
    pub max_amount_minor: i64,
    pub risk_profile: String,
    pub platform_allowlist: Vec<String>,
    pub kill_switch: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantAccount {
    pub fn supports_currency(&self, currency: Currency) -> bool {
        self.currency == currency
    }

    pub fn amount_in_limits(&self, amount_minor: i64) -> bool {
        amount_minor >= self.min_amount_minor && amount_minor < self.max_amount_minor
    }

    pub fn allows_platform(&self, platform: &str) -> bool {
        self.platform_allowlist.is_empty() || self.platform_allowlist.iter().any(|p| p == platform)
    }

    /// Hard constraint filter combining currency, amount, platform and
    /// kill-switch checks (§4.4 step 4); volume caps are evaluated
    /// separately against a rolling counter (see `routing::limits`).
    pub fn passes_hard_constraints(&self, currency: Currency, amount_minor: i64, platform: &str) -> bool {
        !self.kill_switch
            && self.supports_currency(currency)
            && self.amount_in_limits(amount_minor)
            && self.allows_platform(platform)
    }
}
