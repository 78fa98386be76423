//! Per-processor circuit breaker (§4.5, §5): trips on a sustained
//! error ratio rather than a fixed consecutive-failure count, since a
//! processor under partial degradation rarely fails every call.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    requests: AtomicU32,
    failures: AtomicU32,
    opened_at: RwLock<Option<DateTime<Utc>>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CircuitState::Closed),
            requests: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            opened_at: RwLock::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.maybe_half_open(Utc::now());
        *self.state.read().unwrap()
    }

    /// Whether a call is currently allowed through. Call sites should
    /// check this before dispatching and call [`record_success`] or
    /// [`record_failure`] with the outcome.
    pub fn allow_request(&self) -> bool {
        self.maybe_half_open(Utc::now());
        !matches!(*self.state.read().unwrap(), CircuitState::Open)
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Closed;
                self.requests.store(0, Ordering::SeqCst);
                self.failures.store(0, Ordering::SeqCst);
                *self.opened_at.write().unwrap() = None;
            }
            CircuitState::Closed => {
                let requests = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
                if requests >= self.config.min_requests * 4 {
                    self.requests.store(1, Ordering::SeqCst);
                    self.failures.store(0, Ordering::SeqCst);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::HalfOpen => {
                self.trip(&mut state);
            }
            CircuitState::Closed => {
                let requests = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if requests >= self.config.min_requests
                    && failures as f32 / requests as f32 >= self.config.error_ratio
                {
                    self.trip(&mut state);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, state: &mut CircuitState) {
        *state = CircuitState::Open;
        *self.opened_at.write().unwrap() = Some(Utc::now());
    }

    fn maybe_half_open(&self, now: DateTime<Utc>) {
        let should_transition = {
            let state = self.state.read().unwrap();
            let opened_at = self.opened_at.read().unwrap();
            *state == CircuitState::Open
                && opened_at
                    .map(|at| (now - at).num_seconds() >= self.config.open_duration_secs as i64)
                    .unwrap_or(false)
        };
        if should_transition {
            let mut state = self.state.write().unwrap();
            if *state == CircuitState::Open {
                *state = CircuitState::HalfOpen;
                self.requests.store(0, Ordering::SeqCst);
                self.failures.store(0, Ordering::SeqCst);
            }
        }
    }
}
