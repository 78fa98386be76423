use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "approval_state", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
    Escalated,
    Expired,
}

impl ApprovalState {
    pub fn is_decided(&self) -> bool {
        matches!(self, ApprovalState::Approved | ApprovalState::Denied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "approval_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    TrustChallenge,
    RefundReview,
    DisputeResponse,
    PayoutReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalHistoryEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub note: String,
}

/// SLA-tracked review queue entry. Only one decision is ever accepted
/// per entry; a second `decide` call is rejected by the owning
/// service, not by this type (which has no notion of "already
/// decided from the DB's perspective").
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Approval {
    pub id: Uuid,
    pub entity_ref: Uuid,
    pub approval_type: ApprovalType,
    pub state: ApprovalState,
    pub priority: i16,
    pub assignee: Option<String>,
    pub sla_minutes: i32,
    pub sla_at: DateTime<Utc>,
    #[sqlx(json)]
    pub history: sqlx::types::Json<Vec<ApprovalHistoryEntry>>,
    pub decision: Option<String>,
    pub decision_reason: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(
        entity_ref: Uuid,
        approval_type: ApprovalType,
        priority: i16,
        sla_minutes: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_ref,
            approval_type,
            state: ApprovalState::Pending,
            priority,
            assignee: None,
            sla_minutes,
            sla_at: now + chrono::Duration::minutes(sla_minutes as i64),
            history: sqlx::types::Json(Vec::new()),
            decision: None,
            decision_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_past_sla(&self, now: DateTime<Utc>) -> bool {
        self.state == ApprovalState::Pending && now >= self.sla_at
    }

    pub fn escalate(&mut self, now: DateTime<Utc>) {
        self.state = ApprovalState::Escalated;
        self.version += 1;
        self.updated_at = now;
        self.history.0.push(ApprovalHistoryEntry {
            at: now,
            actor: "sla_sweeper".to_string(),
            note: "escalated past SLA".to_string(),
        });
    }

    pub fn decide(
        &mut self,
        decision: &str,
        reason: impl Into<String>,
        decider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalAlreadyDecidedError> {
        if self.state.is_decided() {
            return Err(ApprovalAlreadyDecidedError { entity_ref: self.entity_ref });
        }
        self.state = if decision == "approve" { ApprovalState::Approved } else { ApprovalState::Denied };
        self.decision = Some(decision.to_string());
        self.decision_reason = Some(reason.into());
        self.version += 1;
        self.updated_at = now;
        let decider = decider.into();
        let note = format!("decided: {}", decision);
        self.history.0.push(ApprovalHistoryEntry { at: now, actor: decider, note });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("approval {entity_ref} already has a recorded decision")]
pub struct ApprovalAlreadyDecidedError {
    pub entity_ref: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_decision_is_rejected() {
        let now = Utc::now();
        let mut approval = Approval::new(Uuid::new_v4(), ApprovalType::TrustChallenge, 1, 60, now);
        approval.decide("approve", "looks fine", "reviewer-1", now).unwrap();
        let err = approval.decide("deny", "changed my mind", "reviewer-2", now).unwrap_err();
        assert_eq!(err.entity_ref, approval.entity_ref);
    }

    #[test]
    fn past_sla_only_applies_while_pending() {
        let now = Utc::now();
        let mut approval = Approval::new(Uuid::new_v4(), ApprovalType::RefundReview, 1, 30, now);
        let later = now + chrono::Duration::minutes(31);
        assert!(approval.is_past_sla(later));
        approval.decide("approve", "ok", "r1", later).unwrap();
        assert!(!approval.is_past_sla(later));
    }
}
