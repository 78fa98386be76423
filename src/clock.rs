use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Injected time source. Core logic never calls `Utc::now()`
/// directly so SLA deadlines, cancellation, and cache refresh are
/// deterministically testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests; starts at a fixed instant and only
/// advances when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    micros_since_epoch: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn at(initial: DateTime<Utc>) -> Self {
        Self {
            micros_since_epoch: Arc::new(AtomicI64::new(
                initial.timestamp_micros(),
            )),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        self.micros_since_epoch
            .fetch_add(duration.num_microseconds().unwrap_or(0), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.micros_since_epoch
            .store(at.timestamp_micros(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.micros_since_epoch.load(Ordering::SeqCst);
        DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
    }
}

pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_deterministically() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FixedClock::at(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(30));
    }

    #[test]
    fn fixed_clock_set_overrides_absolute_time() {
        let clock = FixedClock::at(Utc::now());
        let target = DateTime::parse_from_rfc3339("2030-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        clock.set(target);
        assert_eq!(clock.now(), target);
    }
}
