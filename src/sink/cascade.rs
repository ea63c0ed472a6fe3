//! Persistence cascade.
//!
//! ```text
//! deliver(record)
//!   ├── remote store: probe → connect → CALL → close   ok → Remote
//!   ├── local store:  probe → connect → CALL → close   ok → Local
//!   └── fallback file append → alert (best-effort)        → FallbackFile
//!       (the alert is attempted even when the append fails)
//! ```
//!
//! Each tier is tried at most once per record. Health is probed right
//! before every attempt and never cached.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::data::{DeliveryOutcome, DeliveryRecord, SinkKind};
use crate::core::error::{RelayError, Result};
use crate::store::{RecordStore, StoreParams};

use super::alert::{Alert, AlertNotifier, LogNotifier, DEFAULT_BODY, DEFAULT_SUBJECT};
use super::fallback::FallbackFile;

/// Result of probing a store right before a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkHealth {
    /// The store accepted a connection.
    Healthy,
    /// The store could not be reached.
    Unreachable(String),
}

impl SinkHealth {
    /// Check if the store is healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Probe a store within its connect timeout.
pub async fn check_health(store: &dyn RecordStore) -> SinkHealth {
    match timeout(store.connect_timeout(), store.probe()).await {
        Ok(Ok(())) => SinkHealth::Healthy,
        Ok(Err(e)) => SinkHealth::Unreachable(e.to_string()),
        Err(_) => SinkHealth::Unreachable(format!(
            "probe timed out after {:?}",
            store.connect_timeout()
        )),
    }
}

/// Routes records through remote store, local store and fallback file.
///
/// Stateless apart from the store handles and the fallback file lock; one
/// instance is shared by every host poller.
pub struct PersistenceCascade {
    remote: Option<Arc<dyn RecordStore>>,
    local: Option<Arc<dyn RecordStore>>,
    fallback: FallbackFile,
    notifier: Arc<dyn AlertNotifier>,
    alert_subject: String,
    alert_body: String,
}

impl PersistenceCascade {
    /// Start building a cascade that falls back to `fallback_path`.
    pub fn builder(fallback_path: impl Into<PathBuf>) -> CascadeBuilder {
        CascadeBuilder {
            remote: None,
            local: None,
            fallback: FallbackFile::new(fallback_path),
            notifier: None,
            alert_subject: DEFAULT_SUBJECT.to_string(),
            alert_body: DEFAULT_BODY.to_string(),
        }
    }

    /// The fallback file.
    pub fn fallback(&self) -> &FallbackFile {
        &self.fallback
    }

    /// Deliver one record.
    ///
    /// Returns the sink that accepted it. The only error is
    /// [`RelayError::Fallback`], when every store failed and the fallback
    /// append failed too.
    pub async fn deliver(&self, record: &DeliveryRecord) -> Result<DeliveryOutcome> {
        let tiers = [
            (SinkKind::Remote, self.remote.as_ref()),
            (SinkKind::Local, self.local.as_ref()),
        ];

        for (kind, store) in tiers {
            let Some(store) = store else {
                continue;
            };
            match write_through(store.as_ref(), record).await {
                Ok(()) => return Ok(DeliveryOutcome::stored(kind)),
                Err(e) => {
                    warn!(
                        sink = %kind,
                        store = %store.name(),
                        host = %record.host,
                        register = %record.register,
                        error = %e,
                        "Store write failed, trying next tier"
                    );
                }
            }
        }

        let appended = self.fallback.append(record).await.map_err(|e| match e {
            RelayError::Fallback(_) => e,
            other => RelayError::Fallback(format!(
                "{}: {}",
                self.fallback.path().display(),
                other
            )),
        });

        // The operator is alerted whether or not the append succeeded.
        let alert = Alert::for_record(&self.alert_subject, &self.alert_body, record);
        if let Err(e) = self.notifier.notify(&alert).await {
            warn!(host = %record.host, register = %record.register, error = %e, "Alert delivery failed");
        }

        appended?;
        Ok(DeliveryOutcome::fallback())
    }
}

/// Probe, then write through a fresh connection. The connection is closed
/// on every path.
async fn write_through(store: &dyn RecordStore, record: &DeliveryRecord) -> Result<()> {
    if let SinkHealth::Unreachable(reason) = check_health(store).await {
        return Err(RelayError::connection(store.name(), reason));
    }

    let mut conn = match timeout(store.connect_timeout(), store.connect()).await {
        Ok(conn) => conn?,
        Err(_) => {
            return Err(RelayError::connection(
                store.name(),
                format!("connect timed out after {:?}", store.connect_timeout()),
            ))
        }
    };

    let params = StoreParams::from(record);
    let result = match timeout(
        store.operation_timeout(),
        conn.call(store.procedure(), &params),
    )
    .await
    {
        Ok(r) => r,
        Err(_) => Err(RelayError::write(
            store.name(),
            format!("call timed out after {:?}", store.operation_timeout()),
        )),
    };

    if let Err(e) = conn.close().await {
        debug!(store = %store.name(), error = %e, "Connection close failed");
    }
    result
}

/// Builder for [`PersistenceCascade`].
pub struct CascadeBuilder {
    remote: Option<Arc<dyn RecordStore>>,
    local: Option<Arc<dyn RecordStore>>,
    fallback: FallbackFile,
    notifier: Option<Arc<dyn AlertNotifier>>,
    alert_subject: String,
    alert_body: String,
}

impl CascadeBuilder {
    /// Set the remote (primary) store.
    #[must_use]
    pub fn remote(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.remote = Some(store);
        self
    }

    /// Set the local (secondary) store.
    #[must_use]
    pub fn local(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.local = Some(store);
        self
    }

    /// Set the alert notifier. Defaults to [`LogNotifier`].
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the alert subject and body.
    #[must_use]
    pub fn alert_message(mut self, subject: impl Into<String>, body: impl Into<String>) -> Self {
        self.alert_subject = subject.into();
        self.alert_body = body.into();
        self
    }

    /// Build the cascade.
    pub fn build(self) -> PersistenceCascade {
        PersistenceCascade {
            remote: self.remote,
            local: self.local,
            fallback: self.fallback,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            alert_subject: self.alert_subject,
            alert_body: self.alert_body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::RecordValue;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<Alert>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertNotifier for RecordingNotifier {
        async fn notify(&self, alert: &Alert) -> Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            if self.fail {
                return Err(RelayError::AlertDelivery("smtp down".into()));
            }
            Ok(())
        }
    }

    fn record() -> DeliveryRecord {
        DeliveryRecord::new(
            "10.0.0.1",
            "D10",
            "D10",
            RecordValue::Numeric(42.0),
            Utc::now(),
        )
    }

    struct Fixture {
        remote: MemoryStore,
        local: MemoryStore,
        notifier: Arc<RecordingNotifier>,
        cascade: PersistenceCascade,
        _dir: tempfile::TempDir,
    }

    fn fixture(fail_alerts: bool) -> Fixture {
        let dir = tempdir().unwrap();
        let remote = MemoryStore::new("remote");
        let local = MemoryStore::new("local");
        let notifier = Arc::new(RecordingNotifier {
            fail: fail_alerts,
            ..Default::default()
        });
        let cascade = PersistenceCascade::builder(dir.path().join("results.csv"))
            .remote(Arc::new(remote.clone()))
            .local(Arc::new(local.clone()))
            .notifier(notifier.clone())
            .build();
        Fixture {
            remote,
            local,
            notifier,
            cascade,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_remote_healthy() {
        let f = fixture(false);

        let outcome = f.cascade.deliver(&record()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::stored(SinkKind::Remote));
        assert_eq!(f.remote.calls().len(), 1);
        assert!(f.local.calls().is_empty());
        assert!(f.notifier.alerts.lock().unwrap().is_empty());
        // probe + write
        assert_eq!(f.remote.connects(), 2);
        assert_eq!(f.remote.releases(), 2);
    }

    #[tokio::test]
    async fn test_remote_down_local_up() {
        let f = fixture(false);
        f.remote.set_reachable(false);

        let outcome = f.cascade.deliver(&record()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::stored(SinkKind::Local));
        assert_eq!(f.local.calls().len(), 1);
        assert!(f.remote.calls().is_empty());
        assert!(f.notifier.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_rejects_write_falls_through_without_retry() {
        let f = fixture(false);
        f.remote.set_reject_writes(true);

        let outcome = f.cascade.deliver(&record()).await.unwrap();

        assert_eq!(outcome.sink, SinkKind::Local);
        assert_eq!(f.remote.connects(), 2);
        assert_eq!(f.remote.releases(), 2);
    }

    #[tokio::test]
    async fn test_both_down_writes_fallback_and_alerts_once() {
        let f = fixture(false);
        f.remote.set_reachable(false);
        f.local.set_reachable(false);

        let rec = record();
        let outcome = f.cascade.deliver(&rec).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::fallback());
        assert_eq!(f.cascade.fallback().read_records().unwrap(), vec![rec]);
        assert_eq!(f.notifier.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_alert_failure_is_swallowed() {
        let f = fixture(true);
        f.remote.set_reachable(false);
        f.local.set_reachable(false);

        let outcome = f.cascade.deliver(&record()).await.unwrap();
        assert_eq!(outcome.sink, SinkKind::FallbackFile);
        assert!(outcome.alerted);
    }

    #[tokio::test]
    async fn test_fallback_failure_is_the_only_error() {
        let dir = tempdir().unwrap();
        let remote = MemoryStore::new("remote");
        remote.set_reachable(false);
        let cascade = PersistenceCascade::builder(dir.path().join("missing").join("results.csv"))
            .remote(Arc::new(remote))
            .build();

        let err = cascade.deliver(&record()).await.unwrap_err();
        assert!(matches!(err, RelayError::Fallback(_)));
    }

    #[tokio::test]
    async fn test_fallback_failure_still_alerts() {
        let dir = tempdir().unwrap();
        let remote = MemoryStore::new("remote");
        let local = MemoryStore::new("local");
        remote.set_reachable(false);
        local.set_reachable(false);
        let notifier = Arc::new(RecordingNotifier::default());
        let cascade = PersistenceCascade::builder(dir.path().join("missing").join("results.csv"))
            .remote(Arc::new(remote))
            .local(Arc::new(local))
            .notifier(notifier.clone())
            .build();

        let err = cascade.deliver(&record()).await.unwrap_err();

        assert!(matches!(err, RelayError::Fallback(_)));
        let alerts = notifier.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].register, "D10");
    }

    #[tokio::test]
    async fn test_unconfigured_tiers_are_skipped() {
        let dir = tempdir().unwrap();
        let local = MemoryStore::new("local");
        let cascade = PersistenceCascade::builder(dir.path().join("results.csv"))
            .local(Arc::new(local.clone()))
            .build();

        let outcome = cascade.deliver(&record()).await.unwrap();
        assert_eq!(outcome.sink, SinkKind::Local);
        assert_eq!(local.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_write_times_out_and_falls_through() {
        let dir = tempdir().unwrap();
        let remote = MemoryStore::with_settings(
            "remote",
            "insert_tag_reading",
            Duration::from_secs(1),
            Duration::from_millis(100),
        );
        remote.set_latency(Duration::from_secs(10));
        let local = MemoryStore::new("local");
        let cascade = PersistenceCascade::builder(dir.path().join("results.csv"))
            .remote(Arc::new(remote.clone()))
            .local(Arc::new(local.clone()))
            .build();

        let outcome = cascade.deliver(&record()).await.unwrap();

        assert_eq!(outcome.sink, SinkKind::Local);
        assert!(remote.calls().is_empty());
        assert_eq!(remote.connects(), remote.releases());
    }

    #[tokio::test]
    async fn test_check_health() {
        let store = MemoryStore::new("remote");
        assert!(check_health(&store).await.is_healthy());
        store.set_reachable(false);
        assert!(!check_health(&store).await.is_healthy());
    }
}
