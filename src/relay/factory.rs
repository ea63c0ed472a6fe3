//! Relay factory.
//!
//! Creates stores, the alert notifier and the persistence cascade from
//! configuration.

use std::sync::Arc;

use crate::core::error::{RelayError, Result};
use crate::core::traits::DeviceConnector;
use crate::protocols::{VirtualConnector, VirtualDeviceConfig};
use crate::sink::{AlertNotifier, LogNotifier, PersistenceCascade};
use crate::store::{MemoryStore, RecordStore};

use super::config::{AlertKind, AlertSection, RelayConfig, StoreBackend, StoreConfig};

/// Create the store for one tier.
pub fn create_store(tier: &str, config: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::with_settings(
            tier,
            &config.procedure,
            config.connect_timeout(),
            config.operation_timeout(),
        ))),
        StoreBackend::Postgres => create_postgres_store(tier, config),
    }
}

#[cfg(feature = "postgres")]
fn create_postgres_store(tier: &str, config: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    let url = config.resolve_url()?;
    let store = crate::store::PgStore::new(
        tier,
        url,
        &config.procedure,
        config.connect_timeout(),
        config.operation_timeout(),
    )?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
fn create_postgres_store(tier: &str, _config: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    Err(RelayError::Config(format!(
        "stores.{}: postgres backend requires the `postgres` feature",
        tier
    )))
}

/// Create the alert notifier.
pub fn create_notifier(config: &AlertSection) -> Result<Arc<dyn AlertNotifier>> {
    match config.kind {
        AlertKind::Log => Ok(Arc::new(LogNotifier)),
        AlertKind::Webhook => create_webhook_notifier(config),
    }
}

#[cfg(feature = "webhook")]
fn create_webhook_notifier(config: &AlertSection) -> Result<Arc<dyn AlertNotifier>> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| RelayError::Config("alert.url is required for webhook alerts".into()))?;
    let notifier = crate::sink::WebhookNotifier::new(
        url,
        std::time::Duration::from_millis(config.timeout_ms),
    )?;
    Ok(Arc::new(notifier))
}

#[cfg(not(feature = "webhook"))]
fn create_webhook_notifier(_config: &AlertSection) -> Result<Arc<dyn AlertNotifier>> {
    Err(RelayError::Config(
        "webhook alerts require the `webhook` feature".to_string(),
    ))
}

/// Create the persistence cascade shared by every poller.
pub fn create_cascade(config: &RelayConfig) -> Result<PersistenceCascade> {
    let mut builder = PersistenceCascade::builder(&config.relay.fallback_file)
        .notifier(create_notifier(&config.alert)?)
        .alert_message(&config.alert.subject, &config.alert.body);

    if let Some(remote) = &config.stores.remote {
        builder = builder.remote(create_store("remote", remote)?);
    }
    if let Some(local) = &config.stores.local {
        builder = builder.local(create_store("local", local)?);
    }

    Ok(builder.build())
}

/// Connector used when the embedding application supplies none.
///
/// Serves the `virtual` controller type only; virtual registers advance on
/// every read.
pub fn default_connector() -> Arc<dyn DeviceConnector> {
    Arc::new(VirtualConnector::new(
        VirtualDeviceConfig::default().with_auto_advance(true),
    ))
}
