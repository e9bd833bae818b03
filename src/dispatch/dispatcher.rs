//! Alert dispatcher: bounded actuator calls feeding the circuit breaker

use super::actuator::{Actuator, ActuatorError};
use super::breaker::{BreakerTripped, CircuitBreaker};
use super::monitor::BreakerMonitor;
use crate::compliance_core::Alert;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered {
        alert: Alert,
    },
    Failed {
        alert: Alert,
        reason: String,
        /// Set on the failure that tripped the breaker
        tripped: Option<BreakerTripped>,
    },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

pub struct AlertDispatcher {
    actuator: Arc<dyn Actuator>,
    monitor: Arc<dyn BreakerMonitor>,
    breaker: CircuitBreaker,
    function: String,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        monitor: Arc<dyn BreakerMonitor>,
        function: impl Into<String>,
        max_consecutive_failures: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            actuator,
            monitor,
            breaker: CircuitBreaker::new(max_consecutive_failures),
            function: function.into(),
            timeout,
        }
    }

    /// Deliver one alert.
    ///
    /// A tripped breaker only notifies the monitor; the call is still attempted.
    pub async fn dispatch(&self, alert: Alert) -> DispatchOutcome {
        let call = self.actuator.invoke(&self.function, &alert);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ActuatorError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                self.breaker.record_success();
                log::debug!("✅ Alert {} delivered via {}", alert.request_id, self.actuator.actuator_type());
                DispatchOutcome::Delivered { alert }
            }
            Err(e) => {
                log::warn!("⚠️  Failed to dispatch alert {}: {}", alert.request_id, e);

                let tripped = self.breaker.record_failure(Utc::now());
                if let Some(ref notification) = tripped {
                    self.monitor.breaker_tripped(notification).await;
                }

                DispatchOutcome::Failed {
                    alert,
                    reason: e.to_string(),
                    tripped,
                }
            }
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn actuator_type(&self) -> &'static str {
        self.actuator.actuator_type()
    }
}
