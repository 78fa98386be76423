//! Binds a [`ProcessorAdapter`] to its own [`CircuitBreaker`] and HTTP
//! timeout, keyed by processor id (§4.5). The orchestrator looks
//! adapters up here rather than holding them directly, so a tripped
//! breaker is visible to every caller without threading it through
//! every call site.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{CircuitBreakerConfig, ProcessorConfig};
use crate::error::TaxonomyCode;

use super::adapter::{ProcessorAdapter, ProcessorError, ProcessorResult};
use super::circuit_breaker::CircuitBreaker;

struct Entry {
    adapter: Arc<dyn ProcessorAdapter>,
    breaker: CircuitBreaker,
    timeout_ms: u64,
}

pub struct ProcessorRegistry {
    entries: HashMap<String, Entry>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn register(
        &mut self,
        adapter: Arc<dyn ProcessorAdapter>,
        breaker_config: CircuitBreakerConfig,
        processor_config: &ProcessorConfig,
    ) {
        let processor_id = adapter.processor_id().to_string();
        let timeout_ms = processor_config
            .timeouts_ms
            .get(&processor_id)
            .copied()
            .unwrap_or(processor_config.default_timeout_ms);
        self.entries.insert(
            processor_id,
            Entry { adapter, breaker: CircuitBreaker::new(breaker_config), timeout_ms },
        );
    }

    pub fn get(&self, processor_id: &str) -> Option<Arc<dyn ProcessorAdapter>> {
        self.entries.get(processor_id).map(|e| e.adapter.clone())
    }

    pub fn timeout_ms(&self, processor_id: &str) -> Option<u64> {
        self.entries.get(processor_id).map(|e| e.timeout_ms)
    }

    pub fn breaker_open(&self, processor_id: &str) -> bool {
        self.entries.get(processor_id).map(|e| !e.breaker.allow_request()).unwrap_or(false)
    }

    /// Runs `call` against `processor_id`'s adapter, short-circuiting
    /// with [`TaxonomyCode::Transient`] if its breaker is already open,
    /// and feeding the outcome back into the breaker either way.
    pub async fn dispatch<T, F, Fut>(&self, processor_id: &str, call: F) -> ProcessorResult<T>
    where
        F: FnOnce(Arc<dyn ProcessorAdapter>) -> Fut,
        Fut: std::future::Future<Output = ProcessorResult<T>>,
    {
        let entry = self.entries.get(processor_id).ok_or_else(|| {
            ProcessorError::new(TaxonomyCode::InvalidRequest, format!("unknown processor '{processor_id}'"))
        })?;

        if !entry.breaker.allow_request() {
            return Err(ProcessorError::new(TaxonomyCode::Transient, format!("{processor_id} circuit open")));
        }

        let result = call(entry.adapter.clone()).await;
        match &result {
            Ok(_) => entry.breaker.record_success(),
            Err(err) if err.code.is_retryable() => entry.breaker.record_failure(),
            Err(_) => entry.breaker.record_success(),
        }
        result
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::adapter::{AuthorizeRequest, AuthorizeResponse};
    use crate::processors::mock::{MockAdapter, MockOutcome};
    use crate::models::{Currency, PaymentMethod};
    use uuid::Uuid;

    fn breaker_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig { error_ratio: 0.5, min_requests: 2, open_duration_secs: 30 }
    }

    fn processor_config() -> ProcessorConfig {
        ProcessorConfig {
            default_timeout_ms: 5000,
            timeouts_ms: HashMap::from([("stripe".to_string(), 2000)]),
            fee_rate_bps: HashMap::new(),
        }
    }

    fn authorize_request() -> AuthorizeRequest {
        AuthorizeRequest {
            transaction_id: Uuid::new_v4(),
            merchant_account_id: Uuid::new_v4(),
            amount_minor: 500,
            currency: Currency::USD,
            method: PaymentMethod::Card { token: "tok".into(), last4: "1111".into(), expiry: "01/29".into() },
            attempt: 1,
        }
    }

    #[test]
    fn resolves_per_processor_timeout_with_fallback() {
        let mut registry = ProcessorRegistry::new();
        registry.register(
            Arc::new(MockAdapter::new("stripe", b"s".to_vec())),
            breaker_config(),
            &processor_config(),
        );
        registry.register(
            Arc::new(MockAdapter::new("braintree", b"s".to_vec())),
            breaker_config(),
            &processor_config(),
        );
        assert_eq!(registry.timeout_ms("stripe"), Some(2000));
        assert_eq!(registry.timeout_ms("braintree"), Some(5000));
    }

    #[tokio::test]
    async fn dispatch_short_circuits_once_breaker_trips() {
        let mut registry = ProcessorRegistry::new();
        registry.register(
            Arc::new(
                MockAdapter::new("stripe", b"s".to_vec()).with_outcomes(vec![
                    MockOutcome::Decline(TaxonomyCode::Transient),
                    MockOutcome::Decline(TaxonomyCode::Transient),
                ]),
            ),
            breaker_config(),
            &processor_config(),
        );

        for _ in 0..2 {
            let _ = registry
                .dispatch("stripe", |adapter| async move {
                    let req = authorize_request();
                    adapter.authorize(&req).await.map(|r: AuthorizeResponse| r)
                })
                .await;
        }

        assert!(registry.breaker_open("stripe"));
        let result = registry
            .dispatch("stripe", |adapter| async move { adapter.authorize(&authorize_request()).await })
            .await;
        assert_eq!(result.unwrap_err().code, TaxonomyCode::Transient);
    }
}
