//! Approval workflow (§4.9): an SLA-tracked human review queue used
//! by the trust engine's challenge/manual-review bands, refund review,
//! dispute response, and payout review.

pub mod queue;
pub mod sweeper;

pub use queue::ApprovalQueue;
pub use sweeper::ApprovalSweeper;
