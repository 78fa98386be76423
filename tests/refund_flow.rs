mod common;

use std::sync::Arc;

use chrono::Utc;
use fanztrust_engine::clock::{SharedClock, SystemClock};
use fanztrust_engine::config::{ApprovalConfig, CircuitBreakerConfig, LimitsConfig, ProcessorConfig};
use fanztrust_engine::events::EventBus;
use fanztrust_engine::ledger::{Ledger, ReplayFilter};
use fanztrust_engine::models::{
    ApprovalState, Currency, EntryDirection, RefundDecisionSource, RefundStatus, Transaction, TransactionStatus,
};
use fanztrust_engine::orchestrator::{ApprovalQueue, RefundOrchestrator};
use fanztrust_engine::processors::{MockAdapter, ProcessorRegistry};
use fanztrust_engine::repositories::{
    ApprovalRepository, DisputeRepository, LedgerRepository, RefundRepository, TransactionRepository,
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
        payout_minimums_minor: Default::default(),
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

fn captured_transaction(fan_id: Uuid, creator_id: Uuid, amount_minor: i64) -> Transaction {
    let mut txn =
        Transaction::new(fan_id, creator_id, "fanztrust-web".to_string(), amount_minor, Currency::USD, Utc::now());
    txn.status = TransactionStatus::Captured;
    txn.processor_id = Some("stripe".to_string());
    txn.fees_minor = amount_minor * 500 / 10_000;
    txn
}

async fn build_orchestrator(pool: sqlx::PgPool) -> RefundOrchestrator {
    let clock: SharedClock = Arc::new(SystemClock);
    let events = Arc::new(EventBus::new(64));

    let mut registry = ProcessorRegistry::new();
    registry.register(
        Arc::new(MockAdapter::new("stripe", b"whsec_test".to_vec())),
        circuit_breaker_config(),
        &ProcessorConfig { default_timeout_ms: 8_000, timeouts_ms: Default::default(), fee_rate_bps: Default::default() },
    );
    let processors = Arc::new(registry);

    let approvals =
        Arc::new(ApprovalQueue::new(ApprovalRepository::new(pool.clone()), approval_config(), clock.clone()));

    RefundOrchestrator::new(
        TransactionRepository::new(pool.clone()),
        RefundRepository::new(pool.clone()),
        DisputeRepository::new(pool.clone()),
        Ledger::new(LedgerRepository::new(pool.clone())),
        processors,
        approvals,
        events,
        limits(),
        clock,
    )
}

#[tokio::test]
async fn refund_under_auto_approve_limit_processes_immediately_and_balances_the_ledger() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let transactions = TransactionRepository::new(pool.clone());
    let txn = transactions.create(&captured_transaction(Uuid::new_v4(), Uuid::new_v4(), 20_000)).await.unwrap();

    let orchestrator = build_orchestrator(pool.clone()).await;

    let refund = orchestrator
        .request_refund(txn.id, 5_000, "customer_request")
        .await
        .expect("refund under the auto-approve limit should process");

    assert_eq!(refund.status, RefundStatus::Processed);
    assert_eq!(refund.decision_source, Some(RefundDecisionSource::Auto));

    let ledger = Ledger::new(LedgerRepository::new(pool.clone()));
    let entries = ledger
        .replay(ReplayFilter::by_pair_id(format!("tx:{}:refund:{}", txn.id, refund.id)))
        .await
        .unwrap();
    let total: i64 = entries
        .iter()
        .map(|e| match e.direction {
            EntryDirection::Debit => e.amount_minor,
            EntryDirection::Credit => -e.amount_minor,
        })
        .sum();
    assert_eq!(total, 0, "ledger entry set for the refund must balance to zero");

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn refund_above_auto_approve_limit_is_queued_for_manual_review() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let transactions = TransactionRepository::new(pool.clone());
    let txn = transactions.create(&captured_transaction(Uuid::new_v4(), Uuid::new_v4(), 100_000)).await.unwrap();

    let orchestrator = build_orchestrator(pool.clone()).await;

    let refund = orchestrator
        .request_refund(txn.id, 50_000, "dispute_prevention")
        .await
        .expect("refund above the auto-approve limit should still be accepted as pending");

    assert_eq!(refund.status, RefundStatus::Pending);
    assert_eq!(refund.decision_source, None);

    let approvals = ApprovalRepository::new(pool.clone());
    let pending = approvals.find_pending_ordered(50).await.unwrap();
    assert!(
        pending.iter().any(|a| a.entity_ref == refund.id && a.state == ApprovalState::Pending),
        "a refund review entry must be enqueued for the pending refund"
    );

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn partial_refund_leaves_the_transaction_refundable_for_the_remainder() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let transactions = TransactionRepository::new(pool.clone());
    let txn = transactions.create(&captured_transaction(Uuid::new_v4(), Uuid::new_v4(), 12_000)).await.unwrap();

    let orchestrator = build_orchestrator(pool.clone()).await;

    let first = orchestrator
        .request_refund(txn.id, 4_000, "partial_refund")
        .await
        .expect("first partial refund should process");
    assert_eq!(first.status, RefundStatus::Processed);

    let reloaded = transactions.find_by_id(txn.id).await.unwrap().unwrap();
    assert_eq!(reloaded.amount_minor, 12_000);
    assert_eq!(reloaded.refunded_total_minor, 4_000);
    assert_eq!(reloaded.status, TransactionStatus::Captured, "a partial refund must not move the transaction out of Captured");
    assert_eq!(reloaded.remaining_refundable_minor(), 8_000);

    let second = orchestrator
        .request_refund(txn.id, 2_000, "second_partial_refund")
        .await
        .expect("a second non-overlapping partial refund should also process");
    assert_eq!(second.status, RefundStatus::Processed);
    assert_ne!(second.id, first.id);

    let reloaded = transactions.find_by_id(txn.id).await.unwrap().unwrap();
    assert_eq!(reloaded.refunded_total_minor, 6_000);
    assert_eq!(reloaded.status, TransactionStatus::Captured);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn full_refund_moves_the_transaction_to_refunded() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let transactions = TransactionRepository::new(pool.clone());
    let txn = transactions.create(&captured_transaction(Uuid::new_v4(), Uuid::new_v4(), 1_000)).await.unwrap();

    let orchestrator = build_orchestrator(pool.clone()).await;

    let refund = orchestrator
        .request_refund(txn.id, 1_000, "customer_request")
        .await
        .expect("a full refund of the captured amount should process");
    assert_eq!(refund.status, RefundStatus::Processed);

    let reloaded = transactions.find_by_id(txn.id).await.unwrap().unwrap();
    assert_eq!(reloaded.refunded_total_minor, 1_000);
    assert_eq!(reloaded.status, TransactionStatus::Refunded);

    let ledger = Ledger::new(LedgerRepository::new(pool.clone()));
    let capture_entries =
        ledger.replay(ReplayFilter::by_pair_id(format!("tx:{}:capture", txn.id))).await.unwrap();
    assert!(capture_entries.is_empty(), "this test never posts a capture entry; only the refund leg is under test");

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn refund_denial_leaves_the_transaction_captured() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let transactions = TransactionRepository::new(pool.clone());
    let txn = transactions.create(&captured_transaction(Uuid::new_v4(), Uuid::new_v4(), 100_000)).await.unwrap();

    let orchestrator = build_orchestrator(pool.clone()).await;

    let refund = orchestrator
        .request_refund(txn.id, 50_000, "dispute_prevention")
        .await
        .expect("refund above the auto-approve limit should still be accepted as pending");
    assert_eq!(refund.status, RefundStatus::Pending);

    let denied = orchestrator
        .apply_review_decision(refund.id, false)
        .await
        .expect("denial should be recorded against the pending refund");
    assert_eq!(denied.status, RefundStatus::Denied);

    let reloaded = transactions.find_by_id(txn.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TransactionStatus::Captured);
    assert_eq!(reloaded.refunded_total_minor, 0);

    common::cleanup_test_data(&pool).await;
}

#[tokio::test]
async fn approving_a_queued_refund_processes_it_and_refunds_the_transaction() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_data(&pool).await;

    let transactions = TransactionRepository::new(pool.clone());
    let txn = transactions.create(&captured_transaction(Uuid::new_v4(), Uuid::new_v4(), 100_000)).await.unwrap();

    let orchestrator = build_orchestrator(pool.clone()).await;

    let refund = orchestrator
        .request_refund(txn.id, 50_000, "dispute_prevention")
        .await
        .expect("refund above the auto-approve limit should still be accepted as pending");
    assert_eq!(refund.status, RefundStatus::Pending);

    let approved = orchestrator
        .apply_review_decision(refund.id, true)
        .await
        .expect("approving a pending refund should process it");
    assert_eq!(approved.status, RefundStatus::Processed);
    assert_eq!(approved.decision_source, Some(RefundDecisionSource::Manual));

    let reloaded = transactions.find_by_id(txn.id).await.unwrap().unwrap();
    assert_eq!(reloaded.refunded_total_minor, 50_000);
    assert_eq!(reloaded.status, TransactionStatus::Captured);

    common::cleanup_test_data(&pool).await;
}
