//! In-memory reference adapter (§4.5) used throughout the test suite.
//! Outcomes are scripted rather than computed, so a scenario test can
//! drive a processor through a retriable decline, a hard decline, or a
//! fallback without any network dependency.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::TaxonomyCode;

use super::adapter::{
    AuthorizeRequest, AuthorizeResponse, CaptureRequest, CaptureResponse, PayoutSendRequest,
    PayoutSendResponse, ProcessorAdapter, ProcessorError, ProcessorResult, RefundRequest,
    RefundResponse, SettlementLine, VoidRequest, VoidResponse,
};

/// Scripted outcome for one call a [`MockAdapter`] will make.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Approve,
    Decline(TaxonomyCode),
}

pub struct MockAdapter {
    processor_id: String,
    webhook_secret: Vec<u8>,
    outcomes: Mutex<Vec<MockOutcome>>,
    calls: AtomicU32,
    settlement_lines: Mutex<Vec<SettlementLine>>,
}

impl MockAdapter {
    pub fn new(processor_id: impl Into<String>, webhook_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            processor_id: processor_id.into(),
            webhook_secret: webhook_secret.into(),
            outcomes: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            settlement_lines: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes front-to-back: the first call pops the first
    /// entry. Once the queue is empty every further call approves.
    pub fn with_outcomes(self, outcomes: Vec<MockOutcome>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes;
        self
    }

    pub fn with_settlement_lines(self, lines: Vec<SettlementLine>) -> Self {
        *self.settlement_lines.lock().unwrap() = lines;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            MockOutcome::Approve
        } else {
            outcomes.remove(0)
        }
    }

    fn check(&self) -> ProcessorResult<()> {
        match self.next_outcome() {
            MockOutcome::Approve => Ok(()),
            MockOutcome::Decline(code) => Err(ProcessorError::new(code, "scripted decline")),
        }
    }
}

#[async_trait]
impl ProcessorAdapter for MockAdapter {
    fn processor_id(&self) -> &str {
        &self.processor_id
    }

    async fn authorize(&self, _req: &AuthorizeRequest) -> ProcessorResult<AuthorizeResponse> {
        self.check()?;
        Ok(AuthorizeResponse {
            processor_reference: format!("mock_auth_{}", Uuid::new_v4()),
            approved: true,
            raw: json!({ "mock": true }),
        })
    }

    async fn capture(&self, req: &CaptureRequest) -> ProcessorResult<CaptureResponse> {
        self.check()?;
        Ok(CaptureResponse {
            processor_reference: req.processor_reference.clone(),
            raw: json!({ "mock": true }),
        })
    }

    async fn refund(&self, req: &RefundRequest) -> ProcessorResult<RefundResponse> {
        self.check()?;
        Ok(RefundResponse {
            processor_reference: format!("mock_refund_{}", Uuid::new_v4()),
            raw: json!({ "mock": true, "original": req.processor_reference }),
        })
    }

    async fn void(&self, req: &VoidRequest) -> ProcessorResult<VoidResponse> {
        self.check()?;
        Ok(VoidResponse { raw: json!({ "mock": true, "original": req.processor_reference }) })
    }

    async fn payout_send(&self, _req: &PayoutSendRequest) -> ProcessorResult<PayoutSendResponse> {
        self.check()?;
        Ok(PayoutSendResponse {
            processor_reference: format!("mock_payout_{}", Uuid::new_v4()),
            raw: json!({ "mock": true }),
        })
    }

    fn webhook_secret(&self) -> &[u8] {
        &self.webhook_secret
    }

    async fn settlement_fetch(
        &self,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> ProcessorResult<Vec<SettlementLine>> {
        Ok(self.settlement_lines.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Currency, PaymentMethod};

    fn authorize_request() -> AuthorizeRequest {
        AuthorizeRequest {
            transaction_id: Uuid::new_v4(),
            merchant_account_id: Uuid::new_v4(),
            amount_minor: 1000,
            currency: Currency::USD,
            method: PaymentMethod::Card { token: "tok_1".into(), last4: "4242".into(), expiry: "12/30".into() },
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn default_outcome_is_approve() {
        let adapter = MockAdapter::new("stripe", b"secret".to_vec());
        let resp = adapter.authorize(&authorize_request()).await.unwrap();
        assert!(resp.approved);
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn scripted_decline_surfaces_its_taxonomy_code() {
        let adapter = MockAdapter::new("stripe", b"secret".to_vec())
            .with_outcomes(vec![MockOutcome::Decline(TaxonomyCode::HardDecline)]);
        let err = adapter.authorize(&authorize_request()).await.unwrap_err();
        assert_eq!(err.code, TaxonomyCode::HardDecline);
    }

    #[tokio::test]
    async fn outcomes_queue_drains_in_order() {
        let adapter = MockAdapter::new("stripe", b"secret".to_vec()).with_outcomes(vec![
            MockOutcome::Decline(TaxonomyCode::Transient),
            MockOutcome::Approve,
        ]);
        assert!(adapter.authorize(&authorize_request()).await.is_err());
        assert!(adapter.authorize(&authorize_request()).await.is_ok());
        assert!(adapter.authorize(&authorize_request()).await.is_ok());
    }
}
