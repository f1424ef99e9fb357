// =====================================================================================
// ALERT DELIVERY SINKS
// =====================================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use shared_config::AlertSeverity;

use crate::models::AlertChange;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Receiver rejected alert with status {0}")]
    Rejected(u16),
}

/// Destination for alert lifecycle changes.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, change: &AlertChange) -> Result<(), SinkError>;
}

/// Writes alert changes to the tracing log at a level matching severity.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, change: &AlertChange) -> Result<(), SinkError> {
        let alert = change.alert();
        match change {
            AlertChange::Updated(_) => {
                debug!(alert_id = %alert.id, occurrences = alert.occurrences, "Alert still active: {}", alert.title);
            }
            AlertChange::Resolved(_) => {
                info!(
                    alert_id = %alert.id,
                    resolution = alert.resolution.as_deref().unwrap_or(""),
                    "ALERT RESOLVED: {}", alert.title
                );
            }
            AlertChange::Created(_) => match alert.severity {
                AlertSeverity::Critical | AlertSeverity::Error => {
                    error!(
                        alert_id = %alert.id,
                        severity = %alert.severity,
                        category = %alert.category,
                        "CRITICAL ALERT TRIGGERED: {} - {}", alert.title, alert.message
                    );
                }
                AlertSeverity::Warning => {
                    warn!(
                        alert_id = %alert.id,
                        category = %alert.category,
                        "WARNING ALERT: {} - {}", alert.title, alert.message
                    );
                }
                AlertSeverity::Info => {
                    info!(alert_id = %alert.id, "INFO ALERT: {}", alert.title);
                }
            },
        }
        Ok(())
    }
}

/// Posts created and resolved alerts to an HTTP endpoint as JSON.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, change: &AlertChange) -> Result<(), SinkError> {
        if matches!(change, AlertChange::Updated(_)) {
            return Ok(());
        }

        let payload = json!({
            "change": change.label(),
            "alert": change.alert(),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SinkError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected(status.as_u16()));
        }
        debug!(url = %self.url, change = change.label(), "Alert delivered to webhook");
        Ok(())
    }
}
