use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the orchestration engine.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_transaction_created(&self, platform: &str, currency: &str) {
        counter!("fanztrust_transactions_total", "platform" => platform.to_string(), "currency" => currency.to_string()).increment(1);
    }

    pub fn record_transaction_captured(&self, currency: &str) {
        counter!("fanztrust_transactions_captured_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_transaction_failed(&self, reason: &str) {
        counter!("fanztrust_transactions_failed_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn record_trust_score_evaluated(&self, decision: &str, duration_ms: f64) {
        counter!("fanztrust_trust_scores_total", "decision" => decision.to_string()).increment(1);
        histogram!("fanztrust_trust_score_duration_ms").record(duration_ms);
    }

    pub fn record_ledger_post_latency(&self, duration_ms: f64) {
        histogram!("fanztrust_ledger_post_duration_ms").record(duration_ms);
    }

    pub fn record_balance_query_latency(&self, duration_ms: f64, cache_hit: bool) {
        histogram!("fanztrust_balance_query_duration_ms", "cache_hit" => cache_hit.to_string()).record(duration_ms);
    }

    pub fn record_refund_issued(&self, currency: &str) {
        counter!("fanztrust_refunds_total", "currency" => currency.to_string()).increment(1);
    }

    pub fn record_payout_batch_sent(&self, currency: &str, payout_count: u64) {
        counter!("fanztrust_payout_batches_sent_total", "currency" => currency.to_string()).increment(1);
        histogram!("fanztrust_payout_batch_size").record(payout_count as f64);
    }

    pub fn record_webhook_received(&self, processor_id: &str, outcome: &str) {
        counter!("fanztrust_webhooks_total", "processor" => processor_id.to_string(), "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_settlement_discrepancy(&self, processor_id: &str, kind: &str) {
        counter!("fanztrust_settlement_discrepancies_total", "processor" => processor_id.to_string(), "kind" => kind.to_string()).increment(1);
    }

    pub fn record_circuit_breaker_trip(&self, processor_id: &str) {
        counter!("fanztrust_circuit_breaker_trips_total", "processor" => processor_id.to_string()).increment(1);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_db_query(&self, query_type: &str, duration_ms: f64, success: bool) {
        counter!("db_queries_total", "type" => query_type.to_string(), "success" => success.to_string()).increment(1);
        histogram!("db_query_duration_ms", "type" => query_type.to_string()).record(duration_ms);
    }

    pub fn record_redis_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("redis_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("redis_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_kafka_message(&self, topic: &str, success: bool) {
        counter!("kafka_messages_total", "topic" => topic.to_string(), "success" => success.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("fanztrust_transactions_total", Unit::Count, "Total number of payment transactions created");
    describe_counter!("fanztrust_transactions_captured_total", Unit::Count, "Total number of captured transactions");
    describe_counter!("fanztrust_transactions_failed_total", Unit::Count, "Total number of failed transactions");

    describe_counter!("fanztrust_trust_scores_total", Unit::Count, "Total number of trust evaluations by decision");
    describe_histogram!("fanztrust_trust_score_duration_ms", Unit::Milliseconds, "Trust evaluation latency in milliseconds");

    describe_histogram!("fanztrust_ledger_post_duration_ms", Unit::Milliseconds, "Ledger post latency in milliseconds");
    describe_histogram!("fanztrust_balance_query_duration_ms", Unit::Milliseconds, "Balance query latency in milliseconds");

    describe_counter!("fanztrust_refunds_total", Unit::Count, "Total number of refunds issued");
    describe_counter!("fanztrust_payout_batches_sent_total", Unit::Count, "Total number of payout batches sent");
    describe_histogram!("fanztrust_payout_batch_size", Unit::Count, "Number of payouts per sent batch");

    describe_counter!("fanztrust_webhooks_total", Unit::Count, "Total number of webhook deliveries ingested");
    describe_counter!("fanztrust_settlement_discrepancies_total", Unit::Count, "Total number of settlement discrepancies recorded");
    describe_counter!("fanztrust_circuit_breaker_trips_total", Unit::Count, "Total number of processor circuit breaker trips");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");

    describe_counter!("db_queries_total", Unit::Count, "Total database queries");
    describe_histogram!("db_query_duration_ms", Unit::Milliseconds, "Database query latency in milliseconds");

    describe_counter!("redis_operations_total", Unit::Count, "Total Redis operations");
    describe_histogram!("redis_operation_duration_ms", Unit::Milliseconds, "Redis operation latency in milliseconds");

    describe_counter!("kafka_messages_total", Unit::Count, "Total Kafka messages");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10.0);
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert!(metrics.initialized);
    }
}
