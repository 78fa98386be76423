//! Settlement reconciliation (§4.8): matches a processor's settlement
//! file against locally captured transactions for the same window,
//! reports what doesn't line up, and seals the result.

pub mod engine;

pub use engine::SettlementEngine;
