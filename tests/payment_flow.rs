mod common;

use std::sync::Arc;

use chrono::Utc;
use fanztrust_engine::clock::{SharedClock, SystemClock};
use fanztrust_engine::config::{LimitsConfig, ProcessorConfig};
use fanztrust_engine::events::EventBus;
use fanztrust_engine::models::{Currency, MerchantAccount, PaymentMethod, PaymentRequest};
use fanztrust_engine::orchestrator::{ApprovalQueue, PaymentOrchestrator};
use fanztrust_engine::processors::{MockAdapter, MockOutcome, ProcessorRegistry};
use fanztrust_engine::repositories::{
    ApprovalRepository, LedgerRepository, MerchantAccountRepository, RoutingRuleRepository,
    TransactionRepository,
};
use fanztrust_engine::config::{ApprovalConfig, CircuitBreakerConfig};
use fanztrust_engine::error::TaxonomyCode;
use fanztrust_engine::ledger::Ledger;
use fanztrust_engine::models::TransactionStatus;
use fanztrust_engine::routing::Router;
use fanztrust_engine::trust::signals::TrustContext;
use fanztrust_engine::trust::TrustEngine;
use uuid::Uuid;

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

fn processor_config() -> ProcessorConfig {
    ProcessorConfig {
        default_timeout_ms: 8_000,
        timeouts_ms: Default::default(),
        fee_rate_bps: [("stripe".to_string(), 290u32)].into_iter().collect(),
    }
}

fn circuit_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig { error_ratio: 0.5, min_requests: 20, open_duration_secs: 30 }
}

fn approval_config() -> ApprovalConfig {
    ApprovalConfig {
        trust_challenge_sla_minutes: 60,
        refund_review_sla_minutes: 240,
        dispute_response_sla_minutes: 1440,
        payout_review_sla_minutes: 120,
        sweep_interval_secs: 15,
    }
}

fn merchant_account(mid: &str) -> MerchantAccount {
    let now = Utc::now();
    MerchantAccount {
        id: Uuid::new_v4(),
        processor_id: "stripe".to_string(),
        mid: mid.to_string(),
        region: "US".to_string(),
        descriptor: "FANZ*CREATOR".to_string(),
        currency: Currency::USD,
        daily_volume_cap_minor: 1_000_000_00,
        monthly_volume_cap_minor: 10_000_000_00,
        min_amount_minor: 50,
        max_amount_minor: 1_000_000,
        risk_profile: "standard".to_string(),
        platform_allowlist: Vec::new(),
        kill_switch: false,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

fn trusted_context(fan_id: Uuid, creator_id: Uuid, amount_minor: i64) -> TrustContext {
    TrustContext {
        fan_id,
        creator_id,
        platform: "fanztrust-web".to_string(),
        amount_minor,
        currency: Currency::USD,
        method_kind: "card".to_string(),
        ip_address: Some("203.0.113.10".to_string()),
        device_fingerprint: Some("known-device-1".to_string()),
        account_age_days: 400,
        prior_transaction_count: 25,
        prior_chargeback_count: 0,
        velocity_1h_count: 1,
        bin_country: Some("US".to_string()),
        ip_country: Some("US".to_string()),
    }
}

fn challenge_context(fan_id: Uuid, creator_id: Uuid, amount_minor: i64) -> TrustContext {
    TrustContext {
        fan_id,
        creator_id,
        platform: "fanztrust-web".to_string(),
        amount_minor,
        currency: Currency::USD,
        method_kind: "card".to_string(),
        ip_address: None,
        device_fingerprint: None,
        account_age_days: 0,
        prior_transaction_count: 0,
        prior_chargeback_count: 0,
        velocity_1h_count: 0,
        bin_country: None,
        ip_country: None,
    }
}

fn card() -> PaymentMethod {
    PaymentMethod::Card { token: "tok_visa".to_string(), last4: "4242".to_string(), expiry: "12/30".to_string() }
}

struct Harness {
    orchestrator: PaymentOrchestrator,
    router: Arc<Router>,
}

async fn build_harness(pool: sqlx::PgPool, adapter: MockAdapter) -> Harness {
    let clock: SharedClock = Arc::new(SystemClock);
    let events = Arc::new(EventBus::new(64));

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(adapter), circuit_breaker_config(), &processor_config());
    let processors = Arc::new(registry);

    let router = Arc::new(Router::new(
        RoutingRuleRepository::new(pool.clone()),
        MerchantAccountRepository::new(pool.clone()),
        "default".to_string(),
    ));
    router.refresh().await.expect("routing snapshot refresh");

    let trust_collectors: Vec<Arc<dyn fanztrust_engine::trust::signals::SignalCollector>> = vec![
        Arc::new(fanztrust_engine::trust::signals::DeviceSignalCollector),
        Arc::new(fanztrust_engine::trust::signals::NetworkSignalCollector),
        Arc::new(fanztrust_engine::trust::signals::PaymentSignalCollector),
        Arc::new(fanztrust_engine::trust::signals::BehavioralSignalCollector),
        Arc::new(fanztrust_engine::trust::signals::PlatformSignalCollector),
    ];
    let trust_config = fanztrust_engine::config::TrustEngineConfig {
        device_weight: 0.2,
        network_weight: 0.2,
        payment_weight: 0.3,
        behavioral_weight: 0.2,
        platform_weight: 0.1,
        allow_threshold: 70,
        challenge_threshold: 40,
        block_threshold: 20,
        model_version: "trust-v1".to_string(),
    };
    let trust_engine = Arc::new(TrustEngine::new(
        trust_collectors,
        fanztrust_engine::repositories::TrustScoreRepository::new(pool.clone()),
        trust_config,
        limits(),
        clock.clone(),
    ));

    let approvals = Arc::new(ApprovalQueue::new(
        ApprovalRepository::new(pool.clone()),
        approval_config(),
        clock.clone(),
    ));

    let orchestrator = PaymentOrchestrator::new(
        TransactionRepository::new(pool.clone()),
        MerchantAccountRepository::new(pool.clone()),
        Ledger::new(LedgerRepository::new(pool.clone())),
        router.clone(),
        trust_engine,
        processors,
        approvals,
        events,
        limits(),
        processor_config(),
        clock.clone(),
    );

    Harness { orchestrator, router }
}

#[tokio::test]
async fn happy_path_payment_captures_with_correct_fee_split() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let account = MerchantAccountRepository::new(pool.clone())
        .create(&merchant_account("default"))
        .await
        .expect("seed merchant account");

    let harness = build_harness(pool.clone(), MockAdapter::new("stripe", b"whsec_test".to_vec())).await;
    harness.router.refresh().await.unwrap();

    let fan_id = Uuid::new_v4();
    let creator_id = Uuid::new_v4();
    let request = PaymentRequest {
        fan_id,
        creator_id,
        platform: "fanztrust-web".to_string(),
        amount_minor: 10_000,
        currency: Currency::USD,
        method: card(),
        idempotency_key: Uuid::new_v4().to_string(),
    };
    let trust_ctx = trusted_context(fan_id, creator_id, 10_000);

    let txn = harness
        .orchestrator
        .authorize_and_capture(request, trust_ctx, "US")
        .await
        .expect("payment should authorize and capture");

    assert_eq!(txn.status, TransactionStatus::Captured);
    assert_eq!(txn.merchant_account_id, Some(account.id));
    // platform_fee = 10_000 * 500bps = 500; processor_fee = 10_000 * 290bps = 290
    assert_eq!(txn.fees_minor, 500 + 290);

    let ledger = Ledger::new(LedgerRepository::new(pool.clone()));
    let entries = ledger
        .replay(fanztrust_engine::ledger::ReplayFilter::by_pair_id(format!("tx:{}:capture", txn.id)))
        .await
        .unwrap();
    let total: i64 = entries
        .iter()
        .map(|e| match e.direction {
            fanztrust_engine::models::EntryDirection::Debit => e.amount_minor,
            fanztrust_engine::models::EntryDirection::Credit => -e.amount_minor,
        })
        .sum();
    assert_eq!(total, 0, "ledger entry set for the capture must balance to zero");

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn retriable_decline_falls_back_to_the_next_mid() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let merchant_repo = MerchantAccountRepository::new(pool.clone());
    merchant_repo.create(&merchant_account("default")).await.unwrap();
    let fallback = merchant_repo.create(&merchant_account("fallback-1")).await.unwrap();

    let routing_rules = RoutingRuleRepository::new(pool.clone());
    let rule = fanztrust_engine::models::RoutingRule {
        id: Uuid::new_v4(),
        priority: 1,
        active: true,
        conditions: sqlx::types::Json(fanztrust_engine::models::RoutingConditions::default()),
        target: sqlx::types::Json(fanztrust_engine::models::RoutingTarget {
            primary_mid: "default".to_string(),
            fallback_mids: vec!["fallback-1".to_string()],
            split_percentage: None,
        }),
        canary: sqlx::types::Json(fanztrust_engine::models::CanaryConfig::default()),
        version: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    routing_rules.create(&rule).await.unwrap();

    let adapter = MockAdapter::new("stripe", b"whsec_test".to_vec())
        .with_outcomes(vec![MockOutcome::Decline(TaxonomyCode::RetriableDecline)]);
    let harness = build_harness(pool.clone(), adapter).await;
    harness.router.refresh().await.unwrap();

    let fan_id = Uuid::new_v4();
    let creator_id = Uuid::new_v4();
    let request = PaymentRequest {
        fan_id,
        creator_id,
        platform: "fanztrust-web".to_string(),
        amount_minor: 5_000,
        currency: Currency::USD,
        method: card(),
        idempotency_key: Uuid::new_v4().to_string(),
    };
    let trust_ctx = trusted_context(fan_id, creator_id, 5_000);

    let txn = harness
        .orchestrator
        .authorize_and_capture(request, trust_ctx, "US")
        .await
        .expect("payment should fall back and capture");

    assert_eq!(txn.status, TransactionStatus::Captured);
    assert_eq!(txn.merchant_account_id, Some(fallback.id));

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn mid_trust_score_holds_for_verification_then_resumes_on_approval() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let account = MerchantAccountRepository::new(pool.clone())
        .create(&merchant_account("default"))
        .await
        .expect("seed merchant account");

    let harness = build_harness(pool.clone(), MockAdapter::new("stripe", b"whsec_test".to_vec())).await;
    harness.router.refresh().await.unwrap();

    let fan_id = Uuid::new_v4();
    let creator_id = Uuid::new_v4();
    let request = PaymentRequest {
        fan_id,
        creator_id,
        platform: "fanztrust-web".to_string(),
        amount_minor: 7_500,
        currency: Currency::USD,
        method: card(),
        idempotency_key: Uuid::new_v4().to_string(),
    };
    let trust_ctx = challenge_context(fan_id, creator_id, 7_500);

    let held = harness
        .orchestrator
        .authorize_and_capture(request.clone(), trust_ctx, "US")
        .await
        .expect("a mid-band trust score should hold for verification rather than error");
    assert_eq!(held.status, TransactionStatus::RequiresVerification);

    let resumed = harness
        .orchestrator
        .resume_after_challenge(held.id, request, "US")
        .await
        .expect("an approved challenge should resume the authorize/capture pipeline");
    assert_eq!(resumed.status, TransactionStatus::Captured);
    assert_eq!(resumed.merchant_account_id, Some(account.id));

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn denying_a_held_challenge_blocks_the_transaction() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    MerchantAccountRepository::new(pool.clone()).create(&merchant_account("default")).await.unwrap();

    let harness = build_harness(pool.clone(), MockAdapter::new("stripe", b"whsec_test".to_vec())).await;
    harness.router.refresh().await.unwrap();

    let fan_id = Uuid::new_v4();
    let creator_id = Uuid::new_v4();
    let request = PaymentRequest {
        fan_id,
        creator_id,
        platform: "fanztrust-web".to_string(),
        amount_minor: 7_500,
        currency: Currency::USD,
        method: card(),
        idempotency_key: Uuid::new_v4().to_string(),
    };
    let trust_ctx = challenge_context(fan_id, creator_id, 7_500);

    let held = harness
        .orchestrator
        .authorize_and_capture(request, trust_ctx, "US")
        .await
        .expect("a mid-band trust score should hold for verification");
    assert_eq!(held.status, TransactionStatus::RequiresVerification);

    let blocked = harness
        .orchestrator
        .deny_challenge(held.id)
        .await
        .expect("a denied challenge should block the transaction");
    assert_eq!(blocked.status, TransactionStatus::Blocked);

    common::cleanup_test_data(&pool).await;
}
