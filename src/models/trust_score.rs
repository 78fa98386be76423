use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trust_decision", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum TrustDecision {
    Allow,
    Challenge,
    Block,
    AutoApproveRefund,
    ManualReview,
}

/// One row persisted per decision, including the signals snapshot
/// that produced it, so the decision can be replayed and audited.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrustScore {
    pub id: Uuid,
    pub subject_ref: Uuid,
    pub score: i16,
    pub confidence: f32,
    pub model_version: String,
    pub decision: TrustDecision,
    pub reason_codes: Vec<String>,
    pub signals_snapshot: serde_json::Value,
    pub explanation: String,
    pub processing_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_score_serializes_reason_codes() {
        let ts = TrustScore {
            id: Uuid::new_v4(),
            subject_ref: Uuid::new_v4(),
            score: 85,
            confidence: 0.9,
            model_version: "v1".into(),
            decision: TrustDecision::Allow,
            reason_codes: vec!["device_known".into()],
            signals_snapshot: serde_json::json!({}),
            explanation: "clean signals".into(),
            processing_time_ms: 12,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("device_known"));
    }
}
