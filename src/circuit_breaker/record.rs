// src/circuit_breaker/record.rs
//
// The breaker state machine as pure functions over a stored record. Nothing
// here touches a clock or a store; callers pass `now` in epoch milliseconds.

use crate::model::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Failing, rejecting requests
    HalfOpen, // Testing if service recovered
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    pub state: CircuitBreakerState,
    pub failures: u32,
    pub successes: u32,
    #[serde(default)]
    pub last_failure_time: Option<i64>,
    /// Only set while open.
    #[serde(default)]
    pub next_attempt_time: Option<i64>,
}

impl Default for CircuitBreakerRecord {
    fn default() -> Self {
        Self::closed()
    }
}

impl CircuitBreakerRecord {
    pub fn closed() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failures: 0,
            successes: 0,
            last_failure_time: None,
            next_attempt_time: None,
        }
    }

    fn half_open() -> Self {
        Self {
            state: CircuitBreakerState::HalfOpen,
            ..Self::closed()
        }
    }

    fn open(now: i64, timeout_ms: u64) -> Self {
        Self {
            state: CircuitBreakerState::Open,
            failures: 0,
            successes: 0,
            last_failure_time: Some(now),
            next_attempt_time: Some(now.saturating_add(timeout_ms as i64)),
        }
    }

    /// Share of failures among the outcomes counted in the current state.
    pub fn failure_rate(&self) -> f64 {
        let total = self.failures + self.successes;
        if total == 0 {
            0.0
        } else {
            self.failures as f64 / total as f64
        }
    }

    pub fn on_success(self, config: &CircuitBreakerConfig) -> Self {
        match self.state {
            CircuitBreakerState::Closed => Self {
                failures: 0,
                ..self
            },
            CircuitBreakerState::HalfOpen => {
                let successes = self.successes + 1;
                if successes >= config.success_threshold {
                    Self::closed()
                } else {
                    Self { successes, ..self }
                }
            }
            // A straggler finishing after the breaker opened; the open
            // window stands.
            CircuitBreakerState::Open => self,
        }
    }

    pub fn on_failure(self, config: &CircuitBreakerConfig, now: i64) -> Self {
        match self.state {
            CircuitBreakerState::Closed => {
                let next = Self {
                    failures: self.failures + 1,
                    last_failure_time: Some(now),
                    ..self
                };
                if next.failure_rate() >= config.failure_threshold {
                    Self::open(now, config.timeout_ms)
                } else {
                    next
                }
            }
            CircuitBreakerState::HalfOpen => Self::open(now, config.timeout_ms),
            CircuitBreakerState::Open => Self {
                failures: self.failures + 1,
                last_failure_time: Some(now),
                ..self
            },
        }
    }
}

/// Resolve time-based transitions: an open breaker whose wait has elapsed
/// becomes half-open. Other states are returned unchanged.
pub fn evaluate(record: CircuitBreakerRecord, now: i64) -> CircuitBreakerRecord {
    match record.state {
        CircuitBreakerState::Open => match record.next_attempt_time {
            Some(at) if now < at => record,
            _ => CircuitBreakerRecord::half_open(),
        },
        _ => record,
    }
}
