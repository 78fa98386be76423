pub mod handler;
pub mod key_generator;
pub mod storage;

pub use handler::{
    IdempotencyCheckResult, IdempotencyCleanupJob, IdempotencyHandler, IdempotencyHandlerConfig,
    IdempotencyMetrics, MetricsSnapshot,
};
pub use key_generator::{
    IdempotencyAttributes, IdempotencyKeyGenerator, IdempotencyScope, KeyGeneratorConfig,
};
pub use storage::{
    HybridIdempotencyStore, IdempotencyRecord, IdempotencyStatus, PostgresIdempotencyStore,
    RedisIdempotencyCache,
};
