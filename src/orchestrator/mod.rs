//! Orchestration layer (§4.6): owns every status write for the
//! Transaction, Refund, Dispute, and Payout state machines. Each
//! orchestrator serializes concurrent operations against the same
//! entity through its own [`locks::StripedLocks`] instance rather than
//! a single crate-wide lock, so a slow payout batch send never blocks
//! an unrelated payment authorization.

pub mod locks;
pub mod payment;
pub mod payout;
pub mod refund;

pub use crate::approvals::ApprovalQueue;
pub use payment::PaymentOrchestrator;
pub use payout::PayoutOrchestrator;
pub use refund::RefundOrchestrator;
