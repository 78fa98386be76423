//! Independent signal collectors feeding the Trust Engine (§4.3).
//!
//! Each collector scores one dimension of a payment attempt on a
//! 0-100 scale where 100 is maximally trustworthy. A collector that
//! cannot form an opinion (missing input data) returns
//! `available: false` instead of guessing, which lowers the engine's
//! confidence rather than silently voting neutral.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Currency;

/// Everything a collector needs to score one payment attempt. Fields
/// are best-effort; most are `Option`/default-zero because upstream
/// callers (webhooks, the orchestrator) don't always have them.
#[derive(Debug, Clone)]
pub struct TrustContext {
    pub fan_id: Uuid,
    pub creator_id: Uuid,
    pub platform: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub method_kind: String,
    pub ip_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub account_age_days: i32,
    pub prior_transaction_count: u32,
    pub prior_chargeback_count: u32,
    pub velocity_1h_count: u32,
    pub bin_country: Option<String>,
    pub ip_country: Option<String>,
}

/// One collector's verdict. `weight_key` must match a field name on
/// `TrustEngineConfig` (`device`, `network`, `payment`, `behavioral`,
/// `platform`) so the engine can look up its configured weight.
#[derive(Debug, Clone)]
pub struct Signal {
    pub name: &'static str,
    pub weight_key: &'static str,
    pub score: i16,
    pub available: bool,
    pub reason: Option<String>,
}

impl Signal {
    fn scored(name: &'static str, weight_key: &'static str, score: i16, reason: impl Into<String>) -> Self {
        Self {
            name,
            weight_key,
            score: score.clamp(0, 100),
            available: true,
            reason: Some(reason.into()),
        }
    }

    fn unavailable(name: &'static str, weight_key: &'static str) -> Self {
        Self { name, weight_key, score: 50, available: false, reason: None }
    }
}

/// A single scoring dimension. Collectors never return an `Err`: an
/// input they can't evaluate is a neutral, unavailable signal, not a
/// failure of the overall evaluation.
#[async_trait]
pub trait SignalCollector: Send + Sync {
    async fn collect(&self, ctx: &TrustContext) -> Signal;
}

/// Device reputation: known device fingerprint scores well, an absent
/// one is unavailable rather than penalized (many integrations don't
/// send one at all).
pub struct DeviceSignalCollector;

#[async_trait]
impl SignalCollector for DeviceSignalCollector {
    async fn collect(&self, ctx: &TrustContext) -> Signal {
        match &ctx.device_fingerprint {
            None => Signal::unavailable("device", "device"),
            Some(fp) if fp.is_empty() => Signal::unavailable("device", "device"),
            Some(_) if ctx.prior_transaction_count == 0 => {
                Signal::scored("device", "device", 55, "new device, no prior history")
            }
            Some(_) => Signal::scored("device", "device", 85, "device seen on prior transactions"),
        }
    }
}

/// Network reputation: a BIN/IP country mismatch is the classic
/// card-testing tell.
pub struct NetworkSignalCollector;

#[async_trait]
impl SignalCollector for NetworkSignalCollector {
    async fn collect(&self, ctx: &TrustContext) -> Signal {
        match (&ctx.ip_address, &ctx.ip_country, &ctx.bin_country) {
            (None, _, _) => Signal::unavailable("network", "network"),
            (Some(_), Some(ip_country), Some(bin_country)) if ip_country != bin_country => {
                Signal::scored("network", "network", 25, "ip/bin country mismatch")
            }
            (Some(_), _, _) => Signal::scored("network", "network", 80, "ip and bin country consistent"),
        }
    }
}

/// Payment-instrument reputation, driven by how well-established the
/// fan's payment history is relative to the amount at risk.
pub struct PaymentSignalCollector;

#[async_trait]
impl SignalCollector for PaymentSignalCollector {
    async fn collect(&self, ctx: &TrustContext) -> Signal {
        if ctx.prior_chargeback_count > 0 {
            return Signal::scored("payment", "payment", 15, "prior chargeback on file");
        }
        let score = match ctx.prior_transaction_count {
            0 => 45,
            1..=4 => 65,
            5..=19 => 80,
            _ => 92,
        };
        Signal::scored("payment", "payment", score, format!("{} prior transactions", ctx.prior_transaction_count))
    }
}

/// Behavioral velocity: a burst of attempts in the last hour is the
/// strongest single card-testing tell available without external
/// enrichment.
pub struct BehavioralSignalCollector;

#[async_trait]
impl SignalCollector for BehavioralSignalCollector {
    async fn collect(&self, ctx: &TrustContext) -> Signal {
        let score = match ctx.velocity_1h_count {
            0..=2 => 90,
            3..=5 => 60,
            6..=10 => 30,
            _ => 10,
        };
        Signal::scored("behavioral", "behavioral", score, format!("{} attempts in the last hour", ctx.velocity_1h_count))
    }
}

/// Platform/account-tenure reputation.
pub struct PlatformSignalCollector;

#[async_trait]
impl SignalCollector for PlatformSignalCollector {
    async fn collect(&self, ctx: &TrustContext) -> Signal {
        let score = match ctx.account_age_days {
            i32::MIN..=0 => 40,
            1..=6 => 55,
            7..=29 => 70,
            30..=364 => 85,
            _ => 95,
        };
        Signal::scored("platform", "platform", score, format!("account age {} days", ctx.account_age_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TrustContext {
        TrustContext {
            fan_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            platform: "P1".into(),
            amount_minor: 1000,
            currency: Currency::USD,
            method_kind: "card".into(),
            ip_address: None,
            device_fingerprint: None,
            account_age_days: 0,
            prior_transaction_count: 0,
            prior_chargeback_count: 0,
            velocity_1h_count: 0,
            bin_country: None,
            ip_country: None,
        }
    }

    #[tokio::test]
    async fn device_signal_is_unavailable_without_fingerprint() {
        let signal = DeviceSignalCollector.collect(&ctx()).await;
        assert!(!signal.available);
    }

    #[tokio::test]
    async fn network_signal_flags_country_mismatch() {
        let mut c = ctx();
        c.ip_address = Some("1.2.3.4".into());
        c.ip_country = Some("US".into());
        c.bin_country = Some("RU".into());
        let signal = NetworkSignalCollector.collect(&c).await;
        assert!(signal.available);
        assert!(signal.score < 50);
    }

    #[tokio::test]
    async fn payment_signal_penalizes_prior_chargeback() {
        let mut c = ctx();
        c.prior_chargeback_count = 1;
        c.prior_transaction_count = 50;
        let signal = PaymentSignalCollector.collect(&c).await;
        assert_eq!(signal.score, 15);
    }

    #[tokio::test]
    async fn behavioral_signal_penalizes_high_velocity() {
        let mut c = ctx();
        c.velocity_1h_count = 12;
        let signal = BehavioralSignalCollector.collect(&c).await;
        assert!(signal.score <= 10);
    }
}
