use fanztrust_engine::api::{create_router, AppState};
use fanztrust_engine::approvals::{ApprovalQueue, ApprovalSweeper};
use fanztrust_engine::clock::SystemClock;
use fanztrust_engine::config::Settings;
use fanztrust_engine::events::EventBus;
use fanztrust_engine::idempotency::{IdempotencyHandler, IdempotencyHandlerConfig};
use fanztrust_engine::ledger::Ledger;
use fanztrust_engine::observability::{
    init_logging, init_metrics, HealthChecker, LogConfig, LogFormat,
};
use fanztrust_engine::orchestrator::{PaymentOrchestrator, PayoutOrchestrator, RefundOrchestrator};
use fanztrust_engine::processors::{MockAdapter, ProcessorRegistry};
use fanztrust_engine::repositories::{
    ApprovalRepository, BalanceRepository, DisputeRepository, LedgerRepository,
    MerchantAccountRepository, PayoutBatchRepository, PayoutRepository, RefundRepository,
    RoutingRuleRepository, SettlementRepository, TransactionRepository, TrustScoreRepository,
};
use fanztrust_engine::routing::Router;
use fanztrust_engine::settlement::SettlementEngine;
use fanztrust_engine::trust::signals::{
    BehavioralSignalCollector, DeviceSignalCollector, NetworkSignalCollector, PaymentSignalCollector,
    PlatformSignalCollector,
};
use fanztrust_engine::trust::TrustEngine;
use fanztrust_engine::webhooks::WebhookIngestor;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::new()?;

    let log_config = LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(
            std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()).as_str(),
        ),
        include_target: true,
        include_file: false,
        include_line: false,
    };
    init_logging(&log_config);

    let metrics_handle = init_metrics();
    info!("configuration loaded, metrics initialized");

    info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("database connection established");

    info!("running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("migrations applied successfully");

    info!("connecting to redis...");
    let redis_client = redis::Client::open(settings.redis.url.clone())?;
    let mut con = redis_client.get_multiplexed_async_connection().await?;
    let _: () = redis::cmd("PING").query_async(&mut con).await?;
    info!("redis connection established");

    info!("checking kafka connection...");
    use rskafka::client::ClientBuilder;

    let connection = vec![settings.kafka.brokers.clone()];
    let kafka_client = match tokio::time::timeout(Duration::from_secs(3), ClientBuilder::new(connection).build()).await
    {
        Ok(Ok(client)) => {
            info!("kafka client created successfully");
            Some(Arc::new(client))
        }
        Ok(Err(e)) => {
            tracing::warn!("kafka connection failed: {}. continuing without kafka", e);
            None
        }
        Err(_) => {
            tracing::warn!("kafka connection timed out. continuing without kafka");
            None
        }
    };

    let clock: fanztrust_engine::clock::SharedClock = Arc::new(SystemClock);

    let events = Arc::new(EventBus::new(1024));

    let routing_rules = RoutingRuleRepository::new(pool.clone());
    let trust_scores = TrustScoreRepository::new(pool.clone());
    let approvals_repo = ApprovalRepository::new(pool.clone());

    let ledger = Ledger::new(LedgerRepository::new(pool.clone()));

    let mut processor_registry = ProcessorRegistry::new();
    for processor_id in ["stripe", "braintree"] {
        processor_registry.register(
            Arc::new(MockAdapter::new(processor_id, b"whsec_dev_secret".to_vec())),
            settings.circuit_breaker.clone(),
            &settings.processors,
        );
    }
    let processors = Arc::new(processor_registry);

    let router = Arc::new(Router::new(
        routing_rules,
        MerchantAccountRepository::new(pool.clone()),
        settings.router.default_primary_mid.clone(),
    ));
    router.refresh().await?;

    let trust_collectors: Vec<Arc<dyn fanztrust_engine::trust::signals::SignalCollector>> = vec![
        Arc::new(DeviceSignalCollector),
        Arc::new(NetworkSignalCollector),
        Arc::new(PaymentSignalCollector),
        Arc::new(BehavioralSignalCollector),
        Arc::new(PlatformSignalCollector),
    ];
    let trust_engine = Arc::new(
        TrustEngine::new(
            trust_collectors,
            trust_scores,
            settings.trust.clone(),
            settings.limits.clone(),
            clock.clone(),
        )
        .with_events(events.clone()),
    );

    let approval_queue = Arc::new(
        ApprovalQueue::new(approvals_repo, settings.approvals.clone(), clock.clone()).with_events(events.clone()),
    );
    let sweeper = ApprovalSweeper::new(approval_queue.clone(), settings.approvals.sweep_interval_secs);
    sweeper.start();

    let payment_orchestrator = Arc::new(PaymentOrchestrator::new(
        TransactionRepository::new(pool.clone()),
        MerchantAccountRepository::new(pool.clone()),
        Ledger::new(LedgerRepository::new(pool.clone())),
        router.clone(),
        trust_engine.clone(),
        processors.clone(),
        approval_queue.clone(),
        events.clone(),
        settings.limits.clone(),
        settings.processors.clone(),
        clock.clone(),
    ));

    let refund_orchestrator = Arc::new(RefundOrchestrator::new(
        TransactionRepository::new(pool.clone()),
        RefundRepository::new(pool.clone()),
        DisputeRepository::new(pool.clone()),
        Ledger::new(LedgerRepository::new(pool.clone())),
        processors.clone(),
        approval_queue.clone(),
        events.clone(),
        settings.limits.clone(),
        clock.clone(),
    ));

    let payout_orchestrator = Arc::new(PayoutOrchestrator::new(
        PayoutRepository::new(pool.clone()),
        PayoutBatchRepository::new(pool.clone()),
        BalanceRepository::new(pool.clone()),
        processors.clone(),
        approval_queue.clone(),
        events.clone(),
        settings.limits.clone(),
        clock.clone(),
    ));

    let idempotency = Arc::new(IdempotencyHandler::new(
        pool.clone(),
        redis_client.clone(),
        IdempotencyHandlerConfig { ttl_seconds: 86_400, key_prefix: "fanztrust".to_string(), include_timestamp_in_key: false },
    ));

    let webhook_ingestor = Arc::new(WebhookIngestor::new(
        TransactionRepository::new(pool.clone()),
        refund_orchestrator.clone(),
        payout_orchestrator.clone(),
        processors.clone(),
        idempotency.clone(),
        events.clone(),
        settings.webhooks.clone(),
    ));

    let settlement_engine = Arc::new(SettlementEngine::new(
        TransactionRepository::new(pool.clone()),
        SettlementRepository::new(pool.clone()),
        processors.clone(),
        Ledger::new(LedgerRepository::new(pool.clone())),
        events.clone(),
    ));

    let health_checker = Arc::new(HealthChecker::new(pool.clone(), redis_client.clone(), kafka_client.clone()));

    let state = AppState {
        webhook_ingestor,
        payment_orchestrator,
        refund_orchestrator,
        payout_orchestrator,
        settlement_engine,
        health_checker,
        metrics_handle,
    };

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", settings.application.port);
    info!("starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
