mod common;

use std::sync::Arc;

use chrono::Utc;
use fanztrust_engine::clock::{SharedClock, SystemClock};
use fanztrust_engine::config::{ApprovalConfig, CircuitBreakerConfig, LimitsConfig, ProcessorConfig, WebhookConfig};
use fanztrust_engine::events::EventBus;
use fanztrust_engine::idempotency::{IdempotencyHandler, IdempotencyHandlerConfig};
use fanztrust_engine::models::{Currency, Transaction, TransactionStatus};
use fanztrust_engine::orchestrator::{ApprovalQueue, PayoutOrchestrator, RefundOrchestrator};
use fanztrust_engine::processors::{MockAdapter, ProcessorRegistry};
use fanztrust_engine::repositories::{
    ApprovalRepository, BalanceRepository, DisputeRepository, LedgerRepository, PayoutBatchRepository,
    PayoutRepository, RefundRepository, TransactionRepository,
};
use fanztrust_engine::ledger::Ledger;
use fanztrust_engine::webhooks::WebhookIngestor;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b"\n");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn limits() -> LimitsConfig {
    LimitsConfig {
        min_transaction_amount_minor: 50,
        max_transaction_amount_minor: 100_000_000,
        platform_fee_rate_bps: 500,
        auto_approve_limit_minor: 100_000,
        auto_approve_refund_limit_minor: 10_000,
        manual_review_limit_minor: 500_000,
        block_limit_minor: 5_000_000,
        payout_minimums_minor: Default::default(),
    }
}

async fn build_ingestor(pool: sqlx::PgPool, secret: &[u8]) -> (WebhookIngestor, TransactionRepository) {
    let clock: SharedClock = Arc::new(SystemClock);
    let events = Arc::new(EventBus::new(64));

    let mut registry = ProcessorRegistry::new();
    registry.register(
        Arc::new(MockAdapter::new("stripe", secret.to_vec())),
        CircuitBreakerConfig { error_ratio: 0.5, min_requests: 20, open_duration_secs: 30 },
        &ProcessorConfig { default_timeout_ms: 8_000, timeouts_ms: Default::default(), fee_rate_bps: Default::default() },
    );
    let processors = Arc::new(registry);

    let approval_config = ApprovalConfig {
        trust_challenge_sla_minutes: 60,
        refund_review_sla_minutes: 240,
        dispute_response_sla_minutes: 1440,
        payout_review_sla_minutes: 120,
        sweep_interval_secs: 15,
    };
    let approvals = Arc::new(ApprovalQueue::new(ApprovalRepository::new(pool.clone()), approval_config, clock.clone()));

    let refund_orchestrator = Arc::new(RefundOrchestrator::new(
        TransactionRepository::new(pool.clone()),
        RefundRepository::new(pool.clone()),
        DisputeRepository::new(pool.clone()),
        Ledger::new(LedgerRepository::new(pool.clone())),
        processors.clone(),
        approvals.clone(),
        events.clone(),
        limits(),
        clock.clone(),
    ));

    let payout_orchestrator = Arc::new(PayoutOrchestrator::new(
        PayoutRepository::new(pool.clone()),
        PayoutBatchRepository::new(pool.clone()),
        BalanceRepository::new(pool.clone()),
        processors.clone(),
        approvals.clone(),
        events.clone(),
        limits(),
        clock.clone(),
    ));

    let idempotency = Arc::new(IdempotencyHandler::new(
        pool.clone(),
        redis::Client::open(common::redis_url()).expect("redis client"),
        IdempotencyHandlerConfig { ttl_seconds: 86_400, key_prefix: "fanztrust-test".to_string(), include_timestamp_in_key: false },
    ));

    let webhook_config = WebhookConfig { tolerance_seconds: 300, max_body_bytes: 1_048_576 };

    let ingestor = WebhookIngestor::new(
        TransactionRepository::new(pool.clone()),
        refund_orchestrator,
        payout_orchestrator,
        processors,
        idempotency,
        events,
        webhook_config,
    );

    (ingestor, TransactionRepository::new(pool))
}

fn authorized_transaction(fan_id: Uuid, creator_id: Uuid) -> Transaction {
    let mut txn = Transaction::new(fan_id, creator_id, "fanztrust-web".to_string(), 2_500, Currency::USD, Utc::now());
    txn.status = TransactionStatus::Authorized;
    txn.processor_id = Some("stripe".to_string());
    txn
}

#[tokio::test]
async fn duplicate_capture_webhook_is_deduplicated() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let secret = b"whsec_test".to_vec();
    let (ingestor, transactions) = build_ingestor(pool.clone(), &secret).await;

    let txn = transactions.create(&authorized_transaction(Uuid::new_v4(), Uuid::new_v4())).await.unwrap();

    let body = serde_json::json!({
        "external_event_id": format!("evt_{}", Uuid::new_v4()),
        "kind": "capture_ok",
        "transaction_id": txn.id,
    });
    let raw_body = serde_json::to_vec(&body).unwrap();
    let timestamp = Utc::now().timestamp();
    let signature = sign(&secret, timestamp, &raw_body);

    let first = ingestor.ingest("stripe", timestamp, &raw_body, &signature).await.unwrap();
    assert_eq!(first, fanztrust_engine::webhooks::WebhookOutcome::Applied);

    let reloaded = transactions.find_by_id(txn.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TransactionStatus::Captured);

    let second = ingestor.ingest("stripe", timestamp, &raw_body, &signature).await.unwrap();
    assert_eq!(second, fanztrust_engine::webhooks::WebhookOutcome::Duplicate);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let secret = b"whsec_test".to_vec();
    let (ingestor, transactions) = build_ingestor(pool.clone(), &secret).await;
    let txn = transactions.create(&authorized_transaction(Uuid::new_v4(), Uuid::new_v4())).await.unwrap();

    let body = serde_json::json!({
        "external_event_id": format!("evt_{}", Uuid::new_v4()),
        "kind": "capture_ok",
        "transaction_id": txn.id,
    });
    let raw_body = serde_json::to_vec(&body).unwrap();
    let timestamp = Utc::now().timestamp();
    let bad_signature = sign(b"wrong-secret", timestamp, &raw_body);

    let err = ingestor.ingest("stripe", timestamp, &raw_body, &bad_signature).await.unwrap_err();
    assert!(matches!(err, fanztrust_engine::error::AppError::Validation(_)));

    common::cleanup_test_data(&pool).await;
}
