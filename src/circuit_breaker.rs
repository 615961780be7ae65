//! Failure-counting gate in front of an upstream.
//!
//! ```text
//! Closed   -> Open      consecutive failures reach the threshold
//! Open     -> HalfOpen  cool-down elapsed since opened_at (checked on acquire)
//! HalfOpen -> Closed    trial call succeeds
//! HalfOpen -> Open      trial call fails, opened_at refreshed
//! ```
//!
//! State only changes through [`CircuitBreaker::try_acquire_at`],
//! [`CircuitBreaker::record_success`] and [`CircuitBreaker::record_failure_at`].
//! A trial abandoned without an outcome is handed back with
//! [`CircuitBreaker::release_trial`] so the next caller can make it.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BreakerPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Normal call, retries allowed.
    Granted,
    /// The single half-open probe.
    Trial,
    Rejected,
}

impl Permit {
    pub fn allowed(self) -> bool {
        !matches!(self, Permit::Rejected)
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    threshold: u32,
    cooldown: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerPolicy::default())
    }
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            threshold: policy.failure_threshold.max(1),
            cooldown: policy.cooldown,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    pub fn try_acquire(&mut self) -> Permit {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> Permit {
        match self.state {
            BreakerState::Closed => Permit::Granted,
            BreakerState::Open => {
                let Some(opened_at) = self.opened_at else {
                    return Permit::Rejected;
                };
                if now.saturating_duration_since(opened_at) < self.cooldown {
                    return Permit::Rejected;
                }
                self.state = BreakerState::HalfOpen;
                self.trial_in_flight = true;
                info!("circuit half-open, allowing one trial call");
                Permit::Trial
            }
            BreakerState::HalfOpen => {
                if self.trial_in_flight {
                    Permit::Rejected
                } else {
                    self.trial_in_flight = true;
                    Permit::Trial
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != BreakerState::Closed {
            info!(previous = ?self.state, "circuit closed");
        }
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
    }

    /// Give back an outstanding half-open trial that ended without an outcome.
    pub fn release_trial(&mut self) {
        if self.state == BreakerState::HalfOpen && self.trial_in_flight {
            debug!("half-open trial abandoned, releasing it");
            self.trial_in_flight = false;
        }
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            BreakerState::Closed => {
                if self.consecutive_failures >= self.threshold {
                    self.open(now);
                }
            }
            BreakerState::HalfOpen => self.open(now),
            // A call admitted before the circuit opened; the cool-down keeps its start.
            BreakerState::Open => {}
        }
    }

    fn open(&mut self, now: Instant) {
        warn!(
            failures = self.consecutive_failures,
            cooldown_secs = self.cooldown.as_secs(),
            "circuit opened"
        );
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }
}
