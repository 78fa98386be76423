//! Webhook ingestion (§4.7): verifies processor signatures, dedups
//! deliveries, and drives transaction/payout state from confirmed
//! processor events.

pub mod ingestor;
pub mod signature;

pub use ingestor::{WebhookIngestor, WebhookOutcome, WebhookPayload};
