pub mod bus;
pub mod consumer;
pub mod producer;
pub mod types;

pub use bus::EventBus;
pub use consumer::{ConsumerConfig, EventConsumer, MessageHandler};
pub use producer::{EventProducer, ProducerConfig};
pub use types::{
    ApprovalDecided, DisputeLifecycle, EventEnvelope, EventType, PayoutBatchStatusChanged,
    RefundIssued, TransactionStatusChanged, TrustScoreComputed, WebhookReceived,
};
