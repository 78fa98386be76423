//! The `ProcessorAdapter` trait (§4.5): one capability set per payment
//! processor, independent of how any individual processor's API is
//! actually shaped. Adapters translate processor-specific errors into
//! the canonical [`TaxonomyCode`] taxonomy (§7) so the orchestrator
//! never has to know a processor's own error vocabulary.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, TaxonomyCode};
use crate::models::{Currency, PaymentMethod, PayoutMethod};

#[derive(Debug, Clone)]
pub struct ProcessorError {
    pub code: TaxonomyCode,
    pub message: String,
}

impl ProcessorError {
    pub fn new(code: TaxonomyCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        AppError::Processor { code: err.code, message: err.message }
    }
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub transaction_id: Uuid,
    pub merchant_account_id: Uuid,
    pub amount_minor: i64,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct AuthorizeResponse {
    pub processor_reference: String,
    pub approved: bool,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub transaction_id: Uuid,
    pub processor_reference: String,
    pub amount_minor: i64,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct CaptureResponse {
    pub processor_reference: String,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub transaction_id: Uuid,
    pub processor_reference: String,
    pub amount_minor: i64,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct RefundResponse {
    pub processor_reference: String,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct VoidRequest {
    pub transaction_id: Uuid,
    pub processor_reference: String,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct VoidResponse {
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct PayoutSendRequest {
    pub payout_id: Uuid,
    pub amount_minor: i64,
    pub currency: Currency,
    pub method: PayoutMethod,
    pub attempt: u32,
}

#[derive(Debug, Clone)]
pub struct PayoutSendResponse {
    pub processor_reference: String,
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementLineKind {
    Capture,
    Refund,
    Chargeback,
}

#[derive(Debug, Clone)]
pub struct SettlementLine {
    pub processor_reference: String,
    pub kind: SettlementLineKind,
    pub amount_minor: i64,
    pub fee_minor: i64,
}

/// One capability set per processor (§4.5). Every method is keyed by
/// `attempt` so an adapter backed by a real network call can dedup a
/// retried call against `(transaction_id, attempt)` on its own side
/// independent of the crate-level `IdempotencyHandler`.
#[async_trait]
pub trait ProcessorAdapter: Send + Sync {
    fn processor_id(&self) -> &str;

    async fn authorize(&self, req: &AuthorizeRequest) -> ProcessorResult<AuthorizeResponse>;
    async fn capture(&self, req: &CaptureRequest) -> ProcessorResult<CaptureResponse>;
    async fn refund(&self, req: &RefundRequest) -> ProcessorResult<RefundResponse>;
    async fn void(&self, req: &VoidRequest) -> ProcessorResult<VoidResponse>;
    async fn payout_send(&self, req: &PayoutSendRequest) -> ProcessorResult<PayoutSendResponse>;

    /// The shared secret this processor signs webhooks with. Actual
    /// HMAC verification lives in the webhook ingestor, which is
    /// common across processors; adapters only own the secret.
    fn webhook_secret(&self) -> &[u8];

    async fn settlement_fetch(
        &self,
        window_start: chrono::DateTime<chrono::Utc>,
        window_end: chrono::DateTime<chrono::Utc>,
    ) -> ProcessorResult<Vec<SettlementLine>>;
}
