//! Illustrative shape of a real processor integration (§4.5). Nothing
//! in this crate dials out to it; `GenericHttpAdapter` exists so the
//! trait's contract reads against a concrete, non-mock implementation
//! rather than only the in-memory one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

use crate::error::TaxonomyCode;

use super::adapter::{
    AuthorizeRequest, AuthorizeResponse, CaptureRequest, CaptureResponse, PayoutSendRequest,
    PayoutSendResponse, ProcessorAdapter, ProcessorError, ProcessorResult, RefundRequest,
    RefundResponse, SettlementLine, VoidRequest, VoidResponse,
};

pub struct GenericHttpAdapter {
    processor_id: String,
    base_url: String,
    api_key: String,
    webhook_secret: Vec<u8>,
    client: Client,
}

impl GenericHttpAdapter {
    pub fn new(
        processor_id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        webhook_secret: Vec<u8>,
        timeout_ms: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("reqwest client builds with a static timeout");
        Self { processor_id: processor_id.into(), base_url: base_url.into(), api_key: api_key.into(), webhook_secret, client }
    }

    fn taxonomy_for_status(status: reqwest::StatusCode) -> TaxonomyCode {
        match status.as_u16() {
            401 | 403 => TaxonomyCode::AuthenticationFailed,
            402 => TaxonomyCode::HardDecline,
            408 => TaxonomyCode::Timeout,
            409 => TaxonomyCode::Duplicate,
            422 => TaxonomyCode::InvalidRequest,
            429 => TaxonomyCode::RateLimited,
            500..=599 => TaxonomyCode::Transient,
            _ => TaxonomyCode::Unknown,
        }
    }

    fn network_error(err: reqwest::Error) -> ProcessorError {
        let code = if err.is_timeout() { TaxonomyCode::Timeout } else { TaxonomyCode::Transient };
        ProcessorError::new(code, err.to_string())
    }
}

#[async_trait]
impl ProcessorAdapter for GenericHttpAdapter {
    fn processor_id(&self) -> &str {
        &self.processor_id
    }

    async fn authorize(&self, req: &AuthorizeRequest) -> ProcessorResult<AuthorizeResponse> {
        let resp = self
            .client
            .post(format!("{}/v1/authorizations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "transaction_id": req.transaction_id,
                "amount_minor": req.amount_minor,
                "currency": req.currency,
                "attempt": req.attempt,
            }))
            .send()
            .await
            .map_err(Self::network_error)?;

        if !resp.status().is_success() {
            return Err(ProcessorError::new(Self::taxonomy_for_status(resp.status()), "authorize rejected"));
        }
        let body: serde_json::Value = resp.json().await.map_err(Self::network_error)?;
        let processor_reference = body["id"].as_str().unwrap_or_default().to_string();
        Ok(AuthorizeResponse { processor_reference, approved: true, raw: body })
    }

    async fn capture(&self, req: &CaptureRequest) -> ProcessorResult<CaptureResponse> {
        let resp = self
            .client
            .post(format!("{}/v1/authorizations/{}/capture", self.base_url, req.processor_reference))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "amount_minor": req.amount_minor, "attempt": req.attempt }))
            .send()
            .await
            .map_err(Self::network_error)?;

        if !resp.status().is_success() {
            return Err(ProcessorError::new(Self::taxonomy_for_status(resp.status()), "capture rejected"));
        }
        let body: serde_json::Value = resp.json().await.map_err(Self::network_error)?;
        Ok(CaptureResponse { processor_reference: req.processor_reference.clone(), raw: body })
    }

    async fn refund(&self, req: &RefundRequest) -> ProcessorResult<RefundResponse> {
        let resp = self
            .client
            .post(format!("{}/v1/charges/{}/refunds", self.base_url, req.processor_reference))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "amount_minor": req.amount_minor, "attempt": req.attempt }))
            .send()
            .await
            .map_err(Self::network_error)?;

        if !resp.status().is_success() {
            return Err(ProcessorError::new(Self::taxonomy_for_status(resp.status()), "refund rejected"));
        }
        let body: serde_json::Value = resp.json().await.map_err(Self::network_error)?;
        let processor_reference = body["id"].as_str().unwrap_or_default().to_string();
        Ok(RefundResponse { processor_reference, raw: body })
    }

    async fn void(&self, req: &VoidRequest) -> ProcessorResult<VoidResponse> {
        let resp = self
            .client
            .post(format!("{}/v1/authorizations/{}/void", self.base_url, req.processor_reference))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "attempt": req.attempt }))
            .send()
            .await
            .map_err(Self::network_error)?;

        if !resp.status().is_success() {
            return Err(ProcessorError::new(Self::taxonomy_for_status(resp.status()), "void rejected"));
        }
        let body: serde_json::Value = resp.json().await.map_err(Self::network_error)?;
        Ok(VoidResponse { raw: body })
    }

    async fn payout_send(&self, req: &PayoutSendRequest) -> ProcessorResult<PayoutSendResponse> {
        let resp = self
            .client
            .post(format!("{}/v1/payouts", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "payout_id": req.payout_id,
                "amount_minor": req.amount_minor,
                "currency": req.currency,
                "attempt": req.attempt,
            }))
            .send()
            .await
            .map_err(Self::network_error)?;

        if !resp.status().is_success() {
            return Err(ProcessorError::new(Self::taxonomy_for_status(resp.status()), "payout rejected"));
        }
        let body: serde_json::Value = resp.json().await.map_err(Self::network_error)?;
        let processor_reference = body["id"].as_str().unwrap_or_default().to_string();
        Ok(PayoutSendResponse { processor_reference, raw: body })
    }

    fn webhook_secret(&self) -> &[u8] {
        &self.webhook_secret
    }

    async fn settlement_fetch(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> ProcessorResult<Vec<SettlementLine>> {
        let resp = self
            .client
            .get(format!("{}/v1/settlements", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("start", window_start.to_rfc3339()), ("end", window_end.to_rfc3339())])
            .send()
            .await
            .map_err(Self::network_error)?;

        if !resp.status().is_success() {
            return Err(ProcessorError::new(Self::taxonomy_for_status(resp.status()), "settlement fetch rejected"));
        }
        // Real processors each shape this payload differently; parsing
        // it into `SettlementLine` is left to a processor-specific
        // adapter built from this skeleton.
        Ok(Vec::new())
    }
}
