//! End-to-end tests: device read → classification → persistence cascade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use tokio::sync::watch;

use tagrelay::core::tag::resolve;
use tagrelay::protocols::{FailureMode, VirtualDevice, VirtualDeviceHandle};
use tagrelay::relay::{HostDescriptor, HostPoller, RelayContext};
use tagrelay::sink::{Alert, AlertNotifier, PersistenceCascade};
use tagrelay::store::{RecordStore, StoreConnection, StoreParams};
use tagrelay::{DeliveryOutcome, DeviceTarget, MemoryStore, RelayError, Result, SinkKind};

const HOST: &str = "10.0.0.1";

#[derive(Default)]
struct CountingNotifier {
    alerts: AtomicUsize,
}

#[async_trait]
impl AlertNotifier for CountingNotifier {
    async fn notify(&self, _alert: &Alert) -> Result<()> {
        self.alerts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Relay {
    poller: HostPoller,
    device: VirtualDeviceHandle,
    remote: MemoryStore,
    local: MemoryStore,
    notifier: Arc<CountingNotifier>,
    dir: TempDir,
}

impl Relay {
    fn fallback_path(&self) -> std::path::PathBuf {
        self.dir.path().join("results.csv")
    }
}

fn relay(tags: &[(&str, &str)]) -> Relay {
    let dir = tempdir().unwrap();
    let remote = MemoryStore::new("remote");
    let local = MemoryStore::new("local");
    let notifier = Arc::new(CountingNotifier::default());

    let cascade = PersistenceCascade::builder(dir.path().join("results.csv"))
        .remote(Arc::new(remote.clone()))
        .local(Arc::new(local.clone()))
        .notifier(notifier.clone())
        .build();
    let context = RelayContext::new(Arc::new(cascade));

    let target = DeviceTarget::new(HOST, 5002, "virtual");
    let device = VirtualDevice::new(target.clone());
    let handle = device.handle();
    let descriptor = HostDescriptor {
        target,
        poll_interval: Duration::from_secs(5),
        comm_timeout: Duration::from_secs(3),
        tags: resolve(tags.iter().copied()).unwrap(),
    };

    Relay {
        poller: HostPoller::new(descriptor, Box::new(device), &context),
        device: handle,
        remote,
        local,
        notifier,
        dir,
    }
}

#[tokio::test]
async fn test_scenario_a_numeric_value_goes_to_remote() {
    let mut relay = relay(&[("D10", "SWORD")]);
    relay.device.set_value("D10", 42);

    let report = relay.poller.run_cycle().await;

    assert_eq!(report.outcomes, vec![DeliveryOutcome::stored(SinkKind::Remote)]);

    let calls = relay.remote.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].procedure, "insert_tag_reading");
    assert_eq!(
        calls[0].params,
        StoreParams {
            host: HOST.to_string(),
            tag_name: "D10".to_string(),
            register: "D10".to_string(),
            numeric_value: Some(42.0),
            text_value: None,
        }
    );

    assert!(relay.local.calls().is_empty());
    assert!(!relay.fallback_path().exists());
    assert_eq!(relay.notifier.alerts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scenario_b_text_value_goes_to_fallback_file() {
    let mut relay = relay(&[("D10", "SWORD")]);
    relay.device.set_value("D10", "RUN");
    relay.remote.set_reachable(false);
    relay.local.set_reachable(false);

    let report = relay.poller.run_cycle().await;

    assert_eq!(report.outcomes, vec![DeliveryOutcome::fallback()]);
    assert_eq!(relay.notifier.alerts.load(Ordering::SeqCst), 1);

    let content = std::fs::read_to_string(relay.fallback_path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(
        lines[0].starts_with("10.0.0.1,D10,D10,,RUN,"),
        "unexpected line: {}",
        lines[0]
    );

    let timestamp = lines[0].rsplit(',').next().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_c_timeout_skips_cycle_then_recovers() {
    let relay = relay(&[("D10", "SWORD")]);
    relay.device.set_value("D10", 7);
    relay.device.fail_next(1, FailureMode::Timeout);

    let fallback = relay.fallback_path();
    let diagnostics = relay.poller.diagnostics();
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(relay.poller.run(rx));

    // First cycle fails immediately; nothing is written anywhere.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let snap = diagnostics.snapshot();
    assert_eq!(snap.cycles, 1);
    assert_eq!(snap.skipped_cycles, 1);
    assert_eq!(relay.remote.connects(), 0);
    assert_eq!(relay.local.connects(), 0);
    assert!(!fallback.exists());

    // Second cycle runs after the poll interval.
    tokio::time::sleep(Duration::from_secs(5)).await;
    tx.send(true).unwrap();
    let snap = task.await.unwrap();

    assert_eq!(snap.cycles, 2);
    assert_eq!(snap.skipped_cycles, 1);
    assert_eq!(snap.remote_deliveries, 1);
    assert_eq!(relay.remote.calls()[0].params.numeric_value, Some(7.0));
}

#[tokio::test]
async fn test_remote_down_fails_over_to_local_per_record() {
    let mut relay = relay(&[("D10", "SWORD"), ("D11", "FLOAT"), ("M0", "BIT")]);
    relay.device.set_value("D11", 1.5);
    relay.device.set_value("M0", true);
    relay.remote.set_reachable(false);

    let report = relay.poller.run_cycle().await;

    assert_eq!(
        report.outcomes,
        vec![DeliveryOutcome::stored(SinkKind::Local); 3]
    );
    let registers: Vec<String> = relay
        .local
        .calls()
        .into_iter()
        .map(|c| c.params.register)
        .collect();
    assert_eq!(registers, vec!["D10", "D11", "M0"]);
    assert_eq!(relay.local.calls()[2].params.numeric_value, Some(1.0));
    assert_eq!(relay.local.connects(), relay.local.releases());
}

#[tokio::test]
async fn test_store_recovery_between_cycles() {
    let mut relay = relay(&[("D10", "SWORD")]);
    relay.remote.set_reachable(false);
    relay.local.set_reachable(false);

    let first = relay.poller.run_cycle().await;
    assert_eq!(first.outcomes[0].sink, SinkKind::FallbackFile);

    relay.remote.set_reachable(true);
    let second = relay.poller.run_cycle().await;
    assert_eq!(second.outcomes[0].sink, SinkKind::Remote);
    assert_eq!(relay.notifier.alerts.load(Ordering::SeqCst), 1);
}

/// Store that rejects writes for one register.
struct PickyStore {
    reject: &'static str,
    inner: MemoryStore,
}

struct PickyConnection {
    reject: &'static str,
    inner: Box<dyn StoreConnection>,
}

#[async_trait]
impl RecordStore for PickyStore {
    fn name(&self) -> &str {
        "remote"
    }

    fn procedure(&self) -> &str {
        "insert_tag_reading"
    }

    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        Ok(Box::new(PickyConnection {
            reject: self.reject,
            inner: self.inner.connect().await?,
        }))
    }
}

#[async_trait]
impl StoreConnection for PickyConnection {
    async fn call(&mut self, procedure: &str, params: &StoreParams) -> Result<()> {
        if params.register == self.reject {
            return Err(RelayError::write("remote", "constraint violation"));
        }
        self.inner.call(procedure, params).await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_failed_record_does_not_abort_cycle() {
    let dir = tempdir().unwrap();
    let inner = MemoryStore::new("remote");
    let cascade = PersistenceCascade::builder(dir.path().join("missing").join("results.csv"))
        .remote(Arc::new(PickyStore {
            reject: "D10",
            inner: inner.clone(),
        }))
        .build();
    let context = RelayContext::new(Arc::new(cascade));

    let target = DeviceTarget::new(HOST, 5002, "virtual");
    let descriptor = HostDescriptor {
        target: target.clone(),
        poll_interval: Duration::from_secs(5),
        comm_timeout: Duration::from_secs(3),
        tags: resolve([("D10", "SWORD"), ("D11", "SWORD")]).unwrap(),
    };
    let mut poller = HostPoller::new(descriptor, Box::new(VirtualDevice::new(target)), &context);

    let report = poller.run_cycle().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.outcomes, vec![DeliveryOutcome::stored(SinkKind::Remote)]);
    assert_eq!(inner.calls()[0].params.register, "D11");

    let snap = poller.diagnostics().snapshot();
    assert_eq!(snap.failed_deliveries, 1);
    assert!(snap.last_error.unwrap().contains("fallback"));
}
