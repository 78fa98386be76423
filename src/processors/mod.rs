//! Processor adapters (§4.5): one capability set per external payment
//! processor behind a single trait, each with its own circuit breaker.

pub mod adapter;
pub mod circuit_breaker;
pub mod http_adapter;
pub mod mock;
pub mod registry;

pub use adapter::{
    AuthorizeRequest, AuthorizeResponse, CaptureRequest, CaptureResponse, PayoutSendRequest,
    PayoutSendResponse, ProcessorAdapter, ProcessorError, ProcessorResult, RefundRequest,
    RefundResponse, SettlementLine, SettlementLineKind, VoidRequest, VoidResponse,
};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use http_adapter::GenericHttpAdapter;
pub use mock::{MockAdapter, MockOutcome};
pub use registry::ProcessorRegistry;
