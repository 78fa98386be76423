//! FanzTrust scoring engine (§4.3): runs every signal collector
//! concurrently, combines them into a single weighted score, and maps
//! the score onto a decision band. Every evaluation is persisted so a
//! later dispute or audit can replay exactly what was seen.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::{LimitsConfig, TrustEngineConfig};
use crate::error::Result;
use crate::events::bus::EventBus;
use crate::events::types::{EventEnvelope, EventType, TrustScoreComputed};
use crate::models::{TrustDecision, TrustScore};
use crate::repositories::TrustScoreRepository;

use super::signals::{Signal, SignalCollector, TrustContext};

fn weight_for(config: &TrustEngineConfig, weight_key: &str) -> f32 {
    match weight_key {
        "device" => config.device_weight,
        "network" => config.network_weight,
        "payment" => config.payment_weight,
        "behavioral" => config.behavioral_weight,
        "platform" => config.platform_weight,
        _ => 0.0,
    }
}

/// Pure scoring logic, split out from the I/O-bound `evaluate` so it
/// can be unit tested without a repository or event bus.
fn combine(config: &TrustEngineConfig, signals: &[Signal]) -> (i16, f32, Vec<String>) {
    let mut weighted_sum = 0.0f32;
    let mut total_weight = 0.0f32;
    let mut reason_codes = Vec::new();

    for signal in signals {
        if !signal.available {
            continue;
        }
        let weight = weight_for(config, signal.weight_key);
        weighted_sum += signal.score as f32 * weight;
        total_weight += weight;
        if signal.score < 50 {
            reason_codes.push(format!("{}_risk", signal.name));
        }
    }

    let score = if total_weight > 0.0 {
        (weighted_sum / total_weight).round() as i16
    } else {
        50
    };
    let confidence = signals.iter().filter(|s| s.available).count() as f32 / signals.len().max(1) as f32;

    (score.clamp(0, 100), confidence, reason_codes)
}

/// Maps a combined score and the request amount to a decision band
/// (§4.3, §6). `AutoApproveRefund` is never produced here: that band
/// is assigned directly by the refund-orchestration path when the
/// requested amount is under `limits.auto_approve_refund_limit_minor`,
/// independent of the trust score (see DESIGN.md).
///
/// Score alone picks a candidate band — `Allow` at or above
/// `allow_threshold`, `Challenge` above `challenge_threshold`,
/// `ManualReview` above `block_threshold`, `Block` below it — and the
/// three amount-based config options then only ever make the outcome
/// *more* conservative, never less:
/// - `auto_approve_limit`: a score that would `Allow` still needs
///   `amount < auto_approve_limit`; at or above it, the request falls
///   through to `Challenge` instead of being auto-allowed.
/// - `manual_review_limit`: above it, `Challenge` always escalates to
///   `ManualReview`.
/// - `block_limit`: above it, `Challenge`/`ManualReview` both upgrade
///   to `Block`.
fn decide(config: &TrustEngineConfig, limits: &LimitsConfig, score: i16, amount_minor: i64) -> TrustDecision {
    let candidate = if score < config.block_threshold {
        TrustDecision::Block
    } else if score < config.challenge_threshold {
        TrustDecision::ManualReview
    } else if score < config.allow_threshold {
        TrustDecision::Challenge
    } else if amount_minor < limits.auto_approve_limit_minor {
        TrustDecision::Allow
    } else {
        TrustDecision::Challenge
    };

    match candidate {
        TrustDecision::Block | TrustDecision::Allow => candidate,
        TrustDecision::Challenge | TrustDecision::ManualReview => {
            if amount_minor > limits.block_limit_minor {
                TrustDecision::Block
            } else if amount_minor > limits.manual_review_limit_minor {
                TrustDecision::ManualReview
            } else {
                candidate
            }
        }
        other => other,
    }
}

pub struct TrustEngine {
    collectors: Vec<Arc<dyn SignalCollector>>,
    repository: TrustScoreRepository,
    config: TrustEngineConfig,
    limits: LimitsConfig,
    events: Option<Arc<EventBus>>,
    clock: SharedClock,
}

impl TrustEngine {
    pub fn new(
        collectors: Vec<Arc<dyn SignalCollector>>,
        repository: TrustScoreRepository,
        config: TrustEngineConfig,
        limits: LimitsConfig,
        clock: SharedClock,
    ) -> Self {
        Self { collectors, repository, config, limits, events: None, clock }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Runs every collector concurrently, combines the results, and
    /// persists the decision. `subject_ref` is whatever the caller is
    /// scoring trust for — usually the fan, but the same shape serves
    /// a creator-level payout review.
    pub async fn evaluate(&self, subject_ref: Uuid, ctx: &TrustContext) -> Result<TrustScore> {
        let start = Instant::now();

        let futures = self.collectors.iter().map(|c| c.collect(ctx));
        let signals: Vec<Signal> = futures::future::join_all(futures).await;

        let (score, confidence, reason_codes) = combine(&self.config, &signals);
        let decision = decide(&self.config, &self.limits, score, ctx.amount_minor);

        let signals_snapshot = serde_json::json!(signals
            .iter()
            .map(|s| serde_json::json!({
                "name": s.name,
                "score": s.score,
                "available": s.available,
                "reason": s.reason,
            }))
            .collect::<Vec<_>>());

        let explanation = if reason_codes.is_empty() {
            format!("score {} from {} available signals: clean", score, signals.iter().filter(|s| s.available).count())
        } else {
            format!("score {}: {}", score, reason_codes.join(", "))
        };

        let trust_score = TrustScore {
            id: Uuid::new_v4(),
            subject_ref,
            score,
            confidence,
            model_version: self.config.model_version.clone(),
            decision,
            reason_codes,
            signals_snapshot,
            explanation,
            processing_time_ms: start.elapsed().as_millis() as i64,
            created_at: self.clock.now(),
        };

        let persisted = self.repository.create(&trust_score).await?;
        crate::observability::get_metrics()
            .record_trust_score_evaluated(&format!("{:?}", persisted.decision), persisted.processing_time_ms as f64);

        if let Some(events) = &self.events {
            let payload = TrustScoreComputed {
                score_id: persisted.id,
                subject_ref: persisted.subject_ref,
                score: persisted.score,
                decision: format!("{:?}", persisted.decision),
            };
            events
                .publish(EventEnvelope::new(EventType::TrustScoreComputed, subject_ref, payload))
                .await;
        }

        Ok(persisted)
    }
}
