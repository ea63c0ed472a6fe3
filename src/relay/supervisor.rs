//! Supervisor.
//!
//! Starts one [`HostPoller`] per configured host as an independent tokio
//! task, and stops them all through a single `watch` channel.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::error::{RelayError, Result};
use crate::core::logging::{RelayLogConfig, RelayLogHandler};
use crate::core::traits::DeviceConnector;

use super::config::{HostDescriptor, RelayConfig};
use super::factory;
use super::poller::{DiagnosticsSnapshot, HostDiagnostics, HostPoller, RelayContext};

/// A host that was not started.
#[derive(Debug)]
pub struct SkippedHost {
    /// Controller address.
    pub host: String,
    /// Why it was skipped.
    pub error: RelayError,
}

/// Final counters of one host.
#[derive(Debug, Clone)]
pub struct HostSummary {
    /// Controller address.
    pub host: String,
    /// Counters at shutdown.
    pub diagnostics: DiagnosticsSnapshot,
}

struct RunningHost {
    host: String,
    diagnostics: Arc<HostDiagnostics>,
    task: JoinHandle<DiagnosticsSnapshot>,
}

/// Runs every host poller and coordinates shutdown.
pub struct Supervisor {
    context: RelayContext,
    connector: Arc<dyn DeviceConnector>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    running: Vec<RunningHost>,
    skipped: Vec<SkippedHost>,
}

impl Supervisor {
    /// Create a supervisor with no hosts.
    pub fn new(context: RelayContext, connector: Arc<dyn DeviceConnector>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            context,
            connector,
            shutdown_tx,
            shutdown_rx,
            running: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Build the cascade from `config` and create a supervisor.
    ///
    /// Without a `connector`, only `virtual` controllers can be polled.
    pub fn from_config(
        config: &RelayConfig,
        connector: Option<Arc<dyn DeviceConnector>>,
    ) -> Result<Self> {
        let cascade = factory::create_cascade(config)?;
        let context = RelayContext::new(Arc::new(cascade));
        Ok(Self::new(
            context,
            connector.unwrap_or_else(factory::default_connector),
        ))
    }

    /// Route relay events to `handler`, filtered by `config`.
    #[must_use]
    pub fn with_logging(mut self, handler: Arc<dyn RelayLogHandler>, config: RelayLogConfig) -> Self {
        self.context = self
            .context
            .with_log_handler(handler)
            .with_log_config(config);
        self
    }

    /// Start a poller for every enabled host in `config`.
    ///
    /// A host whose tag table or controller type is invalid is logged and
    /// skipped; the others still start. Returns the number started.
    pub fn start(&mut self, config: &RelayConfig) -> usize {
        let mut started = 0;
        for host in config.enabled_hosts() {
            let result = config
                .host_descriptor(host)
                .and_then(|descriptor| self.spawn(descriptor));
            match result {
                Ok(()) => started += 1,
                Err(e) => {
                    error!(host = %host.address, error = %e, "Host not started");
                    self.skipped.push(SkippedHost {
                        host: host.address.clone(),
                        error: e,
                    });
                }
            }
        }
        info!(
            started = started,
            skipped = self.skipped.len(),
            "Host pollers started"
        );
        started
    }

    /// Start a poller for one host.
    pub fn spawn(&mut self, descriptor: HostDescriptor) -> Result<()> {
        let client = self.connector.connect(&descriptor.target)?;
        let host = descriptor.target.host.clone();
        info!(
            host = %host,
            target = %descriptor.target,
            tags = descriptor.tags.len(),
            poll_interval_ms = descriptor.poll_interval.as_millis() as u64,
            "Starting host poller"
        );

        let poller = HostPoller::new(descriptor, client, &self.context);
        let diagnostics = poller.diagnostics();
        let task = tokio::spawn(poller.run(self.shutdown_rx.clone()));

        self.running.push(RunningHost {
            host,
            diagnostics,
            task,
        });
        Ok(())
    }

    /// Number of running pollers.
    pub fn running(&self) -> usize {
        self.running.len()
    }

    /// Hosts that failed to start.
    pub fn skipped(&self) -> &[SkippedHost] {
        &self.skipped
    }

    /// Current counters of every running host.
    pub fn diagnostics(&self) -> Vec<HostSummary> {
        self.running
            .iter()
            .map(|h| HostSummary {
                host: h.host.clone(),
                diagnostics: h.diagnostics.snapshot(),
            })
            .collect()
    }

    /// Broadcast shutdown and wait for every poller to finish its cycle.
    pub async fn shutdown(self) -> Vec<HostSummary> {
        let _ = self.shutdown_tx.send(true);

        let mut summaries = Vec::with_capacity(self.running.len());
        for running in self.running {
            let diagnostics = match running.task.await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(host = %running.host, error = %e, "Poller task ended abnormally");
                    running.diagnostics.snapshot()
                }
            };
            info!(
                host = %running.host,
                cycles = diagnostics.cycles,
                skipped_cycles = diagnostics.skipped_cycles,
                remote = diagnostics.remote_deliveries,
                local = diagnostics.local_deliveries,
                fallback = diagnostics.fallback_deliveries,
                alerts = diagnostics.alerts,
                failed = diagnostics.failed_deliveries,
                "Host summary"
            );
            summaries.push(HostSummary {
                host: running.host,
                diagnostics,
            });
        }
        summaries
    }

    /// Run until `signal` completes, then shut down.
    pub async fn run_until<F>(self, signal: F) -> Vec<HostSummary>
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("Shutdown requested");
        self.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::{VirtualConnector, VirtualDeviceConfig};
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path, hosts: &str) -> RelayConfig {
        let toml = format!(
            "[relay]\nfallback_file = {:?}\n\n[stores.local]\nbackend = \"memory\"\n\n{}",
            dir.join("results.csv").display().to_string(),
            hosts
        );
        RelayConfig::from_toml(&toml).unwrap()
    }

    #[tokio::test]
    async fn test_bad_host_skipped_others_start() {
        let dir = tempdir().unwrap();
        let config = config(
            dir.path(),
            "[[hosts]]\naddress = \"bad\"\ncontroller_type = \"virtual\"\n[hosts.tags]\nD10 = \"WORD\"\n\n\
             [[hosts]]\naddress = \"good\"\ncontroller_type = \"virtual\"\n[hosts.tags]\nD10 = \"SWORD\"\n\n\
             [[hosts]]\naddress = \"plc\"\ncontroller_type = \"iQ-R\"\n[hosts.tags]\nD10 = \"SWORD\"\n\n\
             [[hosts]]\naddress = \"off\"\ncontroller_type = \"virtual\"\nenabled = false\n",
        );

        let mut supervisor = Supervisor::from_config(&config, None).unwrap();
        assert_eq!(supervisor.start(&config), 1);
        assert_eq!(supervisor.running(), 1);

        let skipped: Vec<&str> = supervisor.skipped().iter().map(|s| s.host.as_str()).collect();
        assert_eq!(skipped, vec!["bad", "plc"]);
        assert!(supervisor.skipped()[0].error.is_configuration());

        let summaries = supervisor.shutdown().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].host, "good");
    }

    #[tokio::test]
    async fn test_host_with_bad_settings_skipped_others_start() {
        let dir = tempdir().unwrap();
        let config = config(
            dir.path(),
            "[[hosts]]\naddress = \"slow\"\ncontroller_type = \"virtual\"\npoll_interval_secs = 0\n[hosts.tags]\nD10 = \"SWORD\"\n\n\
             [[hosts]]\naddress = \"good\"\ncontroller_type = \"virtual\"\n[hosts.tags]\nD10 = \"SWORD\"\n",
        );
        config.validate().unwrap();

        let mut supervisor = Supervisor::from_config(&config, None).unwrap();
        assert_eq!(supervisor.start(&config), 1);
        assert_eq!(supervisor.skipped().len(), 1);
        assert_eq!(supervisor.skipped()[0].host, "slow");
        assert!(supervisor.skipped()[0].error.is_configuration());

        let summaries = supervisor.shutdown().await;
        assert_eq!(summaries[0].host, "good");
    }

    #[tokio::test]
    async fn test_hosts_poll_independently() {
        let dir = tempdir().unwrap();
        let config = config(
            dir.path(),
            "[[hosts]]\naddress = \"a\"\ncontroller_type = \"virtual\"\n[hosts.tags]\nD10 = \"SWORD\"\n\n\
             [[hosts]]\naddress = \"b\"\ncontroller_type = \"virtual\"\n[hosts.tags]\nD10 = \"SWORD\"\n",
        );
        let connector = Arc::new(VirtualConnector::new(VirtualDeviceConfig::default()));

        let mut supervisor =
            Supervisor::from_config(&config, Some(connector.clone() as Arc<dyn DeviceConnector>))
                .unwrap();
        supervisor.start(&config);

        let a = connector.handle("a").unwrap();
        a.fail_always(crate::protocols::FailureMode::Error("link down".into()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let summaries = supervisor.run_until(async {}).await;

        let a = summaries.iter().find(|s| s.host == "a").unwrap();
        let b = summaries.iter().find(|s| s.host == "b").unwrap();
        assert!(b.diagnostics.local_deliveries >= 1);
        assert_eq!(b.diagnostics.skipped_cycles, 0);
        assert!(a.diagnostics.cycles >= 1);
        assert_eq!(a.diagnostics.skipped_cycles, a.diagnostics.cycles);
    }
}
