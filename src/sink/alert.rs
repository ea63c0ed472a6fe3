//! Operator alerts.
//!
//! An alert is raised once for every record that had to be written to the
//! fallback file. Delivery is best-effort: the cascade logs a failed alert
//! and carries on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::data::DeliveryRecord;
use crate::core::error::Result;

/// Default alert subject.
pub const DEFAULT_SUBJECT: &str = "tagrelay: data stores unreachable";

/// Default alert body.
pub const DEFAULT_BODY: &str =
    "Both data stores are unreachable. Readings are being written to the fallback file.";

/// One operator alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Short subject line
    pub subject: String,
    /// Message body
    pub body: String,
    /// Host whose record triggered the alert
    pub host: String,
    /// Register of that record
    pub register: String,
    /// Capture time of that record
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Build the alert for a record that went to the fallback file.
    pub fn for_record(
        subject: impl Into<String>,
        body: impl Into<String>,
        record: &DeliveryRecord,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            host: record.host.clone(),
            register: record.register.clone(),
            timestamp: record.timestamp,
        }
    }
}

/// Fire-and-forget alert channel.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Send an alert.
    ///
    /// Fails with [`RelayError::AlertDelivery`](crate::RelayError::AlertDelivery).
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Notifier that emits alerts as `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl AlertNotifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        tracing::error!(
            subject = %alert.subject,
            host = %alert.host,
            register = %alert.register,
            at = %alert.timestamp.to_rfc3339(),
            "{}",
            alert.body
        );
        Ok(())
    }
}

#[cfg(feature = "webhook")]
pub use webhook::WebhookNotifier;

#[cfg(feature = "webhook")]
mod webhook {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{Alert, AlertNotifier};
    use crate::core::error::{RelayError, Result};

    /// Notifier that POSTs each alert as JSON to a webhook URL.
    #[derive(Debug, Clone)]
    pub struct WebhookNotifier {
        client: reqwest::Client,
        url: String,
    }

    impl WebhookNotifier {
        /// Create a notifier with a per-request timeout.
        pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| RelayError::Config(format!("webhook client: {}", e)))?;
            Ok(Self {
                client,
                url: url.into(),
            })
        }
    }

    #[async_trait]
    impl AlertNotifier for WebhookNotifier {
        async fn notify(&self, alert: &Alert) -> Result<()> {
            let response = self
                .client
                .post(&self.url)
                .json(alert)
                .send()
                .await
                .map_err(|e| RelayError::AlertDelivery(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RelayError::AlertDelivery(format!(
                    "webhook returned {}",
                    status
                )));
            }
            Ok(())
        }
    }
}
