pub mod api;
pub mod approvals;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod ledger;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod processors;
pub mod repositories;
pub mod routing;
pub mod services;
pub mod settlement;
pub mod trust;
pub mod webhooks;
