mod common;

use std::sync::Arc;

use chrono::Utc;
use fanztrust_engine::clock::{SharedClock, SystemClock};
use fanztrust_engine::config::{ApprovalConfig, CircuitBreakerConfig, LimitsConfig, ProcessorConfig};
use fanztrust_engine::events::EventBus;
use fanztrust_engine::models::{AccountBalance, Currency, PayoutMethod, PayoutStatus};
use fanztrust_engine::orchestrator::{ApprovalQueue, PayoutOrchestrator};
use fanztrust_engine::processors::{MockAdapter, ProcessorRegistry};
use fanztrust_engine::repositories::{
    ApprovalRepository, BalanceRepository, PayoutBatchRepository, PayoutRepository,
};
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
        payout_minimums_minor: [("bank_transfer".to_string(), 100i64)].into_iter().collect(),
    }
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

fn build_orchestrator(pool: sqlx::PgPool) -> PayoutOrchestrator {
    let clock: SharedClock = Arc::new(SystemClock);
    let events = Arc::new(EventBus::new(64));

    let mut registry = ProcessorRegistry::new();
    registry.register(
        Arc::new(MockAdapter::new("stripe", b"whsec_test".to_vec())),
        CircuitBreakerConfig { error_ratio: 0.5, min_requests: 20, open_duration_secs: 30 },
        &ProcessorConfig { default_timeout_ms: 8_000, timeouts_ms: Default::default(), fee_rate_bps: Default::default() },
    );
    let processors = Arc::new(registry);

    let approvals = Arc::new(ApprovalQueue::new(
        ApprovalRepository::new(pool.clone()),
        approval_config(),
        clock.clone(),
    ));

    PayoutOrchestrator::new(
        PayoutRepository::new(pool.clone()),
        PayoutBatchRepository::new(pool.clone()),
        BalanceRepository::new(pool.clone()),
        processors,
        approvals,
        events,
        limits(),
        clock,
    )
}

/// End-to-end scenario 6: creator has balance=921, two concurrent
/// payout requests of 921 arrive. Exactly one reserves the funds and
/// succeeds; the other observes an exhausted balance and fails with
/// a validation error, leaving the creator's reserved/available split
/// consistent with a single in-flight payout.
#[tokio::test]
async fn concurrent_payouts_for_the_same_creator_only_one_reserves_the_balance() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let creator_id = Uuid::new_v4();
    let balances = BalanceRepository::new(pool.clone());
    balances
        .create(&AccountBalance::new(creator_id, Currency::USD, Utc::now()))
        .await
        .expect("seed balance row");
    balances.credit(creator_id, Currency::USD, 921).await.expect("seed available balance");

    let orchestrator = Arc::new(build_orchestrator(pool.clone()));

    let o1 = orchestrator.clone();
    let o2 = orchestrator.clone();
    let (r1, r2) = tokio::join!(
        o1.request_payout(creator_id, PayoutMethod::BankTransfer, 921, Currency::USD),
        o2.request_payout(creator_id, PayoutMethod::BankTransfer, 921, Currency::USD),
    );

    let results = [r1, r2];
    let succeeded: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.is_err()).collect();

    assert_eq!(succeeded.len(), 1, "exactly one concurrent payout request should reserve the balance");
    assert_eq!(failed.len(), 1, "the other request should see an exhausted balance");

    let payout = succeeded[0].as_ref().unwrap();
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(payout.amount_minor, 921);

    let balance = balances
        .find_by_creator_and_currency(creator_id, Currency::USD)
        .await
        .expect("query balance")
        .expect("balance row exists");
    assert_eq!(balance.available_minor, 0);
    assert_eq!(balance.reserved_minor, 921);
}

/// A payout request below the method's configured minimum is rejected
/// before any balance reservation is attempted.
#[tokio::test]
async fn payout_below_method_minimum_is_rejected_without_reserving_funds() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let creator_id = Uuid::new_v4();
    let balances = BalanceRepository::new(pool.clone());
    balances
        .create(&AccountBalance::new(creator_id, Currency::USD, Utc::now()))
        .await
        .expect("seed balance row");
    balances.credit(creator_id, Currency::USD, 5_000).await.expect("seed available balance");

    let orchestrator = build_orchestrator(pool.clone());

    let result = orchestrator.request_payout(creator_id, PayoutMethod::BankTransfer, 50, Currency::USD).await;
    assert!(result.is_err());

    let balance = balances
        .find_by_creator_and_currency(creator_id, Currency::USD)
        .await
        .expect("query balance")
        .expect("balance row exists");
    assert_eq!(balance.available_minor, 5_000);
    assert_eq!(balance.reserved_minor, 0);
}
