//! Layered configuration (§6, §10): `config/default.toml` provides the
//! baseline, `config/local.toml` is an optional untracked override, and
//! `APP__SECTION__FIELD` environment variables win over both. Secrets
//! (database/redis URLs, processor API keys) are expected to arrive via
//! the environment layer in every deployed environment.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub kafka: KafkaSettings,
    pub application: ApplicationSettings,
    pub cache: CacheSettings,
    pub trust: TrustEngineConfig,
    pub router: RouterConfig,
    pub processors: ProcessorConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub approvals: ApprovalConfig,
    pub webhooks: WebhookConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub log_level: String,
}

/// Redis-backed balance cache in front of the ledger-derived
/// `creator_balances` table (§4.1 supplement).
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub balance_ttl_secs: i64,
    pub key_prefix: String,
}

/// Signal weights and score-band thresholds for the Trust Engine
/// (§4.3). Weights need not sum to 1.0; the engine normalizes over the
/// signals that actually resolved for a given evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustEngineConfig {
    pub device_weight: f32,
    pub network_weight: f32,
    pub payment_weight: f32,
    pub behavioral_weight: f32,
    pub platform_weight: f32,
    pub allow_threshold: i16,
    pub challenge_threshold: i16,
    pub block_threshold: i16,
    pub model_version: String,
}

/// Defaults for the Router when no persisted `RoutingRule` matches
/// (§4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub default_primary_mid: String,
    pub snapshot_refresh_secs: u64,
}

/// Per-processor HTTP timeouts (§4.4). Processor ids not present here
/// fall back to `default_timeout_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    pub default_timeout_ms: u64,
    pub timeouts_ms: HashMap<String, u64>,
    pub fee_rate_bps: HashMap<String, u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub error_ratio: f32,
    pub min_requests: u32,
    pub open_duration_secs: u64,
}

/// Default SLA minutes per `ApprovalType`, used when an orchestration
/// step doesn't supply an explicit deadline (§4.9).
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalConfig {
    pub trust_challenge_sla_minutes: i32,
    pub refund_review_sla_minutes: i32,
    pub dispute_response_sla_minutes: i32,
    pub payout_review_sla_minutes: i32,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub tolerance_seconds: i64,
    pub max_body_bytes: usize,
}

/// Amount bounds and fee schedule shared by the router and
/// orchestrator (§6 config table).
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub min_transaction_amount_minor: i64,
    pub max_transaction_amount_minor: i64,
    pub platform_fee_rate_bps: u32,
    pub auto_approve_limit_minor: i64,
    pub auto_approve_refund_limit_minor: i64,
    pub manual_review_limit_minor: i64,
    pub block_limit_minor: i64,
    pub payout_minimums_minor: HashMap<String, i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_config_falls_back_to_default_timeout() {
        let cfg = ProcessorConfig {
            default_timeout_ms: 5000,
            timeouts_ms: HashMap::from([("stripe".to_string(), 3000)]),
            fee_rate_bps: HashMap::new(),
        };
        let timeout = cfg.timeouts_ms.get("braintree").copied().unwrap_or(cfg.default_timeout_ms);
        assert_eq!(timeout, 5000);
        let timeout = cfg.timeouts_ms.get("stripe").copied().unwrap_or(cfg.default_timeout_ms);
        assert_eq!(timeout, 3000);
    }
}
