//! External actuation endpoint that receives alerts

use crate::compliance_core::Alert;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug)]
pub enum ActuatorError {
    Http(reqwest::Error),
    Rejected(u16),
    Timeout(Duration),
}

impl From<reqwest::Error> for ActuatorError {
    fn from(err: reqwest::Error) -> Self {
        ActuatorError::Http(err)
    }
}

impl std::fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorError::Http(e) => write!(f, "HTTP error: {}", e),
            ActuatorError::Rejected(status) => write!(f, "actuator rejected alert with status {}", status),
            ActuatorError::Timeout(d) => write!(f, "actuator did not answer within {}ms", d.as_millis()),
        }
    }
}

impl std::error::Error for ActuatorError {}

/// Receives one alert per call; `function` identifies the remote handler
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn invoke(&self, function: &str, alert: &Alert) -> Result<(), ActuatorError>;

    /// Actuator kind for logging
    fn actuator_type(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvokePayload<'a> {
    function: &'a str,
    request_id: &'a str,
    timestamp: &'a str,
}

/// POSTs `{function, requestId, timestamp}` as JSON to a fixed URL
pub struct HttpActuator {
    client: reqwest::Client,
    url: String,
}

impl HttpActuator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ActuatorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn invoke(&self, function: &str, alert: &Alert) -> Result<(), ActuatorError> {
        let payload = InvokePayload {
            function,
            request_id: &alert.request_id,
            timestamp: &alert.timestamp,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(ActuatorError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }

    fn actuator_type(&self) -> &'static str {
        "HTTP"
    }
}

/// Dry-run actuator: logs the alert and always succeeds
pub struct LogActuator;

#[async_trait]
impl Actuator for LogActuator {
    async fn invoke(&self, function: &str, alert: &Alert) -> Result<(), ActuatorError> {
        log::info!(
            "🚨 [dry-run] {} ← alert {} at {}",
            function,
            alert.request_id,
            alert.timestamp
        );
        Ok(())
    }

    fn actuator_type(&self) -> &'static str {
        "log"
    }
}
