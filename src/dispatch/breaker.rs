//! Consecutive-failure circuit breaker shared by all dispatch attempts

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub tripped: bool,
    pub last_trip: Option<DateTime<Utc>>,
}

/// Emitted once each time the failure run reaches the threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerTripped {
    pub tripped_at: String,
    pub consecutive_failures: u32,
}

/// Breaker state behind one mutex; updates are totally ordered across alerts.
pub struct CircuitBreaker {
    state: Mutex<CircuitBreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            state: Mutex::new(CircuitBreakerState {
                consecutive_failures: 0,
                threshold,
                tripped: false,
                last_trip: None,
            }),
        }
    }

    /// Any success closes the breaker and clears the failure run
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.tripped {
            log::info!(
                "✅ Dispatch recovered after {} consecutive failures, breaker reset",
                state.consecutive_failures
            );
        }
        state.consecutive_failures = 0;
        state.tripped = false;
    }

    /// Count one failure. Returns the trip notification when this failure crosses
    /// the threshold; later failures of the same run return `None`.
    pub fn record_failure(&self, now: DateTime<Utc>) -> Option<BreakerTripped> {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.tripped || state.consecutive_failures < state.threshold {
            return None;
        }

        state.tripped = true;
        state.last_trip = Some(now);
        Some(BreakerTripped {
            tripped_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            consecutive_failures: state.consecutive_failures,
        })
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        // Every update is a single assignment, so a poisoned lock still holds valid counters
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
