//! FanzTrust scoring engine (§4.3).

pub mod engine;
pub mod signals;

pub use engine::TrustEngine;
pub use signals::{
    BehavioralSignalCollector, DeviceSignalCollector, NetworkSignalCollector,
    PaymentSignalCollector, PlatformSignalCollector, Signal, SignalCollector, TrustContext,
};
