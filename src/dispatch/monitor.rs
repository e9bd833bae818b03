//! Operational-monitoring channel for breaker trips

use super::breaker::BreakerTripped;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait BreakerMonitor: Send + Sync {
    /// Signal only; the caller keeps dispatching regardless of the result
    async fn breaker_tripped(&self, notification: &BreakerTripped);
}

/// Reports trips through the log at error level
pub struct LogMonitor;

#[async_trait]
impl BreakerMonitor for LogMonitor {
    async fn breaker_tripped(&self, notification: &BreakerTripped) {
        log::error!(
            "🔥 Max consecutive dispatch failures reached ({} at {}), notifying monitor",
            notification.consecutive_failures,
            notification.tripped_at
        );
    }
}

/// POSTs the trip notification as JSON to a webhook, logging it as well
pub struct WebhookMonitor {
    client: reqwest::Client,
    url: String,
}

impl WebhookMonitor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl BreakerMonitor for WebhookMonitor {
    async fn breaker_tripped(&self, notification: &BreakerTripped) {
        LogMonitor.breaker_tripped(notification).await;

        match self.client.post(&self.url).json(notification).send().await {
            Ok(resp) if resp.status().is_success() => {
                log::debug!("Trip notification delivered to {}", self.url);
            }
            Ok(resp) => {
                log::warn!("⚠️  Monitor webhook answered {}", resp.status());
            }
            Err(e) => {
                log::warn!("⚠️  Monitor webhook unreachable: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_shape() {
        let trip = BreakerTripped {
            tripped_at: "2024-01-01T00:00:00.000Z".to_string(),
            consecutive_failures: 3,
        };
        let json = serde_json::to_string(&trip).unwrap();
        assert_eq!(
            json,
            r#"{"trippedAt":"2024-01-01T00:00:00.000Z","consecutiveFailures":3}"#
        );
    }
}
