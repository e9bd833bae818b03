//! Alert dispatch to the external actuator, guarded by a circuit breaker

pub mod actuator;
pub mod breaker;
pub mod dispatcher;
pub mod monitor;

pub use actuator::{Actuator, ActuatorError, HttpActuator, LogActuator};
pub use breaker::{BreakerTripped, CircuitBreaker, CircuitBreakerState};
pub use dispatcher::{AlertDispatcher, DispatchOutcome};
pub use monitor::{BreakerMonitor, LogMonitor, WebhookMonitor};
