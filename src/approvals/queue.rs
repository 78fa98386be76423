//! Approval queue (§4.9): creates SLA-tracked review entries and
//! enforces that only one decision is ever accepted per entry. The
//! background sweeper that escalates past-SLA entries lives alongside
//! this in [`super::sweeper`].

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::ApprovalConfig;
use crate::error::{AppError, Result};
use crate::events::bus::EventBus;
use crate::events::types::{ApprovalDecided, EventEnvelope, EventType};
use crate::models::{Approval, ApprovalType};
use crate::repositories::ApprovalRepository;

fn default_sla_minutes(config: &ApprovalConfig, approval_type: ApprovalType) -> i32 {
    match approval_type {
        ApprovalType::TrustChallenge => config.trust_challenge_sla_minutes,
        ApprovalType::RefundReview => config.refund_review_sla_minutes,
        ApprovalType::DisputeResponse => config.dispute_response_sla_minutes,
        ApprovalType::PayoutReview => config.payout_review_sla_minutes,
    }
}

pub struct ApprovalQueue {
    repository: ApprovalRepository,
    config: ApprovalConfig,
    events: Option<Arc<EventBus>>,
    clock: SharedClock,
}

impl ApprovalQueue {
    pub fn new(repository: ApprovalRepository, config: ApprovalConfig, clock: SharedClock) -> Self {
        Self { repository, config, events: None, clock }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Enqueues a review entry with a priority-derived SLA deadline.
    /// `sla_minutes_override` lets a caller (e.g. a dispute with an
    /// externally imposed deadline) bypass the configured default.
    pub async fn enqueue(
        &self,
        entity_ref: Uuid,
        approval_type: ApprovalType,
        priority: i16,
        sla_minutes_override: Option<i32>,
    ) -> Result<Approval> {
        let sla_minutes = sla_minutes_override.unwrap_or_else(|| default_sla_minutes(&self.config, approval_type));
        let approval = Approval::new(entity_ref, approval_type, priority, sla_minutes, self.clock.now());
        self.repository.create(&approval).await
    }

    /// Records the single accepted decision for `approval_id`. A
    /// second call against an already-decided entry is rejected with
    /// `AppError::Validation`, and a concurrent decision that lands
    /// first is surfaced as `AppError::VersionConflict`.
    pub async fn decide(
        &self,
        approval_id: Uuid,
        decision: &str,
        reason: impl Into<String>,
        decider: impl Into<String>,
    ) -> Result<Approval> {
        let mut approval = self
            .repository
            .find_by_id(approval_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("approval {approval_id}")))?;

        approval
            .decide(decision, reason, decider, self.clock.now())
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let updated = self
            .repository
            .update_with_version(&approval)
            .await?
            .ok_or(AppError::VersionConflict { entity: "approval", id: approval_id })?;

        if let Some(events) = &self.events {
            let payload = ApprovalDecided {
                approval_id: updated.id,
                entity_ref: updated.entity_ref,
                approved: updated.decision.as_deref() == Some("approve"),
                decided_by: updated.history.0.last().map(|h| h.actor.clone()),
            };
            events
                .publish(EventEnvelope::new(EventType::ApprovalDecided, updated.entity_ref, payload))
                .await;
        }

        Ok(updated)
    }

    pub async fn find_past_sla(&self) -> Result<Vec<Approval>> {
        self.repository.find_past_sla(Utc::now()).await
    }

    /// Escalates one past-SLA entry. Returns `Ok(None)` rather than an
    /// error when a concurrent decision or escalation beat this one to
    /// the row, since losing that race is an expected outcome, not a
    /// failure.
    pub async fn escalate(&self, approval_id: Uuid) -> Result<Option<Approval>> {
        let mut approval = self
            .repository
            .find_by_id(approval_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("approval {approval_id}")))?;

        if !approval.is_past_sla(self.clock.now()) {
            return Ok(None);
        }
        approval.escalate(self.clock.now());
        self.repository.update_with_version(&approval).await
    }
}
