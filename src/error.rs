use serde::Serialize;

/// Canonical error taxonomy for processor and orchestration failures.
///
/// Every adapter error is classified into exactly one of these before
/// it crosses an orchestration boundary; the orchestrator's retry and
/// fallback logic switches on this enum, never on adapter-specific
/// error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyCode {
    Transient,
    RetriableDecline,
    HardDecline,
    Fraud,
    Duplicate,
    InvalidRequest,
    AuthenticationFailed,
    RateLimited,
    Timeout,
    Unknown,
}

impl TaxonomyCode {
    /// Whether the orchestrator should retry the same adapter call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaxonomyCode::Transient | TaxonomyCode::RateLimited)
    }

    /// Whether the orchestrator should advance to the next MID in the
    /// fallback chain instead of retrying the same one.
    pub fn triggers_fallback(&self) -> bool {
        matches!(self, TaxonomyCode::RetriableDecline)
    }

    /// Whether this error terminates the transaction outright.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaxonomyCode::HardDecline | TaxonomyCode::Fraud | TaxonomyCode::Duplicate
        )
    }
}

impl std::fmt::Display for TaxonomyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaxonomyCode::Transient => "transient",
            TaxonomyCode::RetriableDecline => "retriable_decline",
            TaxonomyCode::HardDecline => "hard_decline",
            TaxonomyCode::Fraud => "fraud",
            TaxonomyCode::Duplicate => "duplicate",
            TaxonomyCode::InvalidRequest => "invalid_request",
            TaxonomyCode::AuthenticationFailed => "authentication_failed",
            TaxonomyCode::RateLimited => "rate_limited",
            TaxonomyCode::Timeout => "timeout",
            TaxonomyCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// The crate-wide error type. Infrastructure errors convert in via
/// `#[from]`; orchestration code otherwise constructs variants
/// directly so call sites stay close to the taxonomy in use.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("ledger conflict: {0}")]
    LedgerConflict(String),

    #[error("idempotency conflict: in-flight reservation held for key")]
    IdempotencyInFlight { retry_after_ms: u64 },

    #[error("processor error [{code}]: {message}")]
    Processor {
        code: TaxonomyCode,
        message: String,
    },

    #[error("optimistic concurrency conflict on {entity} {id}")]
    VersionConflict { entity: &'static str, id: uuid::Uuid },

    #[error("service overloaded")]
    Overloaded,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps this error to the taxonomy code surfaced to callers, per
    /// the error handling design's user-visible failure envelope.
    pub fn taxonomy_code(&self) -> TaxonomyCode {
        match self {
            AppError::Validation(_) => TaxonomyCode::InvalidRequest,
            AppError::NotFound(_) => TaxonomyCode::InvalidRequest,
            AppError::Database(_) => TaxonomyCode::Unknown,
            AppError::Redis(_) => TaxonomyCode::Unknown,
            AppError::LedgerConflict(_) => TaxonomyCode::Unknown,
            AppError::IdempotencyInFlight { .. } => TaxonomyCode::Transient,
            AppError::Processor { code, .. } => *code,
            AppError::VersionConflict { .. } => TaxonomyCode::Transient,
            AppError::Overloaded => TaxonomyCode::Transient,
            AppError::DeadlineExceeded => TaxonomyCode::Timeout,
            AppError::Internal(_) => TaxonomyCode::Unknown,
        }
    }

    /// Whether logs may include the full message; everything else
    /// gets only the taxonomy code and a correlation id.
    pub fn is_internal_detail_safe_to_log(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }
}

/// The JSON envelope returned to external callers on failure.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: TaxonomyCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub correlation_id: uuid::Uuid,
}

impl ErrorEnvelope {
    pub fn from_error(err: &AppError, correlation_id: uuid::Uuid) -> Self {
        let retry_after_ms = match err {
            AppError::IdempotencyInFlight { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        };
        Self {
            success: false,
            error: err.taxonomy_code(),
            hint: match err {
                AppError::Validation(msg) => Some(msg.clone()),
                AppError::NotFound(msg) => Some(msg.clone()),
                _ => None,
            },
            retry_after_ms,
            correlation_id,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_decline_triggers_fallback_not_retry() {
        assert!(TaxonomyCode::RetriableDecline.triggers_fallback());
        assert!(!TaxonomyCode::RetriableDecline.is_retryable());
    }

    #[test]
    fn transient_is_retryable_not_terminal() {
        assert!(TaxonomyCode::Transient.is_retryable());
        assert!(!TaxonomyCode::Transient.is_terminal());
    }

    #[test]
    fn hard_decline_and_fraud_are_terminal() {
        assert!(TaxonomyCode::HardDecline.is_terminal());
        assert!(TaxonomyCode::Fraud.is_terminal());
        assert!(TaxonomyCode::Duplicate.is_terminal());
    }

    #[test]
    fn error_envelope_carries_hint_for_validation() {
        let err = AppError::Validation("amount too large".to_string());
        let corr = uuid::Uuid::new_v4();
        let envelope = ErrorEnvelope::from_error(&err, corr);
        assert!(!envelope.success);
        assert_eq!(envelope.hint.as_deref(), Some("amount too large"));
        assert_eq!(envelope.correlation_id, corr);
    }

    #[test]
    fn in_flight_error_carries_retry_after() {
        let err = AppError::IdempotencyInFlight { retry_after_ms: 250 };
        let envelope = ErrorEnvelope::from_error(&err, uuid::Uuid::new_v4());
        assert_eq!(envelope.retry_after_ms, Some(250));
        assert_eq!(envelope.error, TaxonomyCode::Transient);
    }
}
