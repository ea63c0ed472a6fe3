//! Host poller.
//!
//! One poller owns one controller. Each cycle it reads the whole tag set,
//! then hands every value to the shared persistence cascade, strictly in
//! tag order:
//!
//! ```text
//! Idle → Polling ─ok─→ Dispatching → Sleeping → Polling …
//!           └─fail────────────────────↗
//! any state ── shutdown ──→ Stopped
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::core::data::{DeliveryOutcome, DeliveryRecord, SinkKind, TagReading};
use crate::core::error::RelayError;
use crate::core::logging::{LogContext, RelayLogConfig, RelayLogHandler, TracingLogHandler};
use crate::core::traits::{DeviceClient, PollerState};
use crate::sink::PersistenceCascade;

use super::config::HostDescriptor;

/// Everything a poller shares with its siblings.
///
/// Created once by the supervisor and handed to every poller.
#[derive(Clone)]
pub struct RelayContext {
    /// Shared persistence cascade.
    pub cascade: Arc<PersistenceCascade>,
    /// Relay event handler.
    pub log_handler: Arc<dyn RelayLogHandler>,
    /// Relay event filter.
    pub log_config: RelayLogConfig,
}

impl RelayContext {
    /// Create a context that reports relay events through `tracing`.
    pub fn new(cascade: Arc<PersistenceCascade>) -> Self {
        Self {
            cascade,
            log_handler: Arc::new(TracingLogHandler),
            log_config: RelayLogConfig::default(),
        }
    }

    /// Set the relay event handler.
    #[must_use]
    pub fn with_log_handler(mut self, handler: Arc<dyn RelayLogHandler>) -> Self {
        self.log_handler = handler;
        self
    }

    /// Set the relay event filter.
    #[must_use]
    pub fn with_log_config(mut self, config: RelayLogConfig) -> Self {
        self.log_config = config;
        self
    }

    fn log_context(&self, host: &str) -> LogContext {
        LogContext::new(host)
            .with_handler(Arc::clone(&self.log_handler))
            .with_config(self.log_config.clone())
    }
}

/// Live per-host counters.
#[derive(Debug, Default)]
pub struct HostDiagnostics {
    cycles: AtomicU64,
    skipped_cycles: AtomicU64,
    remote_deliveries: AtomicU64,
    local_deliveries: AtomicU64,
    fallback_deliveries: AtomicU64,
    alerts: AtomicU64,
    failed_deliveries: AtomicU64,
    tag_errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HostDiagnostics {
    fn record_outcome(&self, outcome: DeliveryOutcome) {
        let counter = match outcome.sink {
            SinkKind::Remote => &self.remote_deliveries,
            SinkKind::Local => &self.local_deliveries,
            SinkKind::FallbackFile => &self.fallback_deliveries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if outcome.alerted {
            self.alerts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn set_last_error(&self, error: String) {
        match self.last_error.lock() {
            Ok(mut guard) => *guard = Some(error),
            Err(poisoned) => *poisoned.into_inner() = Some(error),
        }
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let last_error = match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        DiagnosticsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            remote_deliveries: self.remote_deliveries.load(Ordering::Relaxed),
            local_deliveries: self.local_deliveries.load(Ordering::Relaxed),
            fallback_deliveries: self.fallback_deliveries.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
            tag_errors: self.tag_errors.load(Ordering::Relaxed),
            last_error,
        }
    }
}

/// Point-in-time copy of [`HostDiagnostics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles whose read failed.
    pub skipped_cycles: u64,
    /// Records accepted by the remote store.
    pub remote_deliveries: u64,
    /// Records accepted by the local store.
    pub local_deliveries: u64,
    /// Records written to the fallback file.
    pub fallback_deliveries: u64,
    /// Alerts attempted.
    pub alerts: u64,
    /// Records that could not be persisted anywhere.
    pub failed_deliveries: u64,
    /// Values the device flagged with a per-tag error.
    pub tag_errors: u64,
    /// Most recent read or delivery error.
    pub last_error: Option<String>,
}

impl DiagnosticsSnapshot {
    /// Total records persisted to any sink.
    pub fn delivered(&self) -> u64 {
        self.remote_deliveries + self.local_deliveries + self.fallback_deliveries
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Cycle sequence number, starting at 1.
    pub cycle: u64,
    /// Read error if the cycle was skipped.
    pub skipped: Option<String>,
    /// Outcome of every delivered record, in tag order.
    pub outcomes: Vec<DeliveryOutcome>,
    /// Values the device flagged with a per-tag error.
    pub tag_errors: usize,
    /// Records that could not be persisted.
    pub failed: usize,
}

impl CycleReport {
    /// Check if the read failed and nothing was dispatched.
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// Polling loop for one controller.
pub struct HostPoller {
    descriptor: HostDescriptor,
    client: Box<dyn DeviceClient>,
    cascade: Arc<PersistenceCascade>,
    log: LogContext,
    state: PollerState,
    cycle: u64,
    diagnostics: Arc<HostDiagnostics>,
}

impl HostPoller {
    /// Create a poller. The tag set in `descriptor` is fixed for its lifetime.
    pub fn new(
        descriptor: HostDescriptor,
        client: Box<dyn DeviceClient>,
        context: &RelayContext,
    ) -> Self {
        let log = context.log_context(&descriptor.target.host);
        Self {
            descriptor,
            client,
            cascade: Arc::clone(&context.cascade),
            log,
            state: PollerState::Idle,
            cycle: 0,
            diagnostics: Arc::new(HostDiagnostics::default()),
        }
    }

    /// Controller host.
    pub fn host(&self) -> &str {
        &self.descriptor.target.host
    }

    /// Current state.
    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Shared counters, readable while the poller runs.
    pub fn diagnostics(&self) -> Arc<HostDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Time between cycles.
    pub fn poll_interval(&self) -> Duration {
        self.descriptor.poll_interval
    }

    async fn set_state(&mut self, new_state: PollerState) {
        if self.state != new_state {
            let old_state = self.state;
            self.state = new_state;
            self.log.log_state_changed(old_state, new_state).await;
        }
    }

    /// Run one read-and-dispatch cycle.
    ///
    /// Never fails: a read failure skips the cycle and a delivery failure
    /// skips only its record.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        self.diagnostics.cycles.fetch_add(1, Ordering::Relaxed);
        let mut report = CycleReport {
            cycle: self.cycle,
            ..Default::default()
        };

        self.set_state(PollerState::Polling).await;
        self.log
            .log_cycle_started(self.cycle, self.descriptor.tags.len())
            .await;

        let started = Instant::now();
        let comm_timeout = self.descriptor.comm_timeout;
        let read = match timeout(comm_timeout, self.client.read(&self.descriptor.tags)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::CommunicationTimeout {
                host: self.descriptor.target.host.clone(),
            }),
        };

        let values = match read {
            Ok(values) => values,
            Err(e) => {
                let error = e.to_string();
                self.diagnostics
                    .skipped_cycles
                    .fetch_add(1, Ordering::Relaxed);
                self.diagnostics.set_last_error(error.clone());
                self.log.log_cycle_skipped(error.clone()).await;
                report.skipped = Some(error);
                return report;
            }
        };
        let captured_at = Utc::now();
        self.log
            .log_read_completed(values.len(), started.elapsed().as_millis() as u64)
            .await;

        self.set_state(PollerState::Dispatching).await;
        let host = self.descriptor.target.host.clone();

        for value in values {
            let reading = TagReading::from_tag_value(host.as_str(), value, captured_at);

            // Flagged values are still delivered.
            if let Some(error) = &reading.communication_error {
                report.tag_errors += 1;
                self.diagnostics.tag_errors.fetch_add(1, Ordering::Relaxed);
                self.log.log_tag_error(&reading.register, error).await;
            }

            let record = DeliveryRecord::from_reading(&reading);
            match self.cascade.deliver(&record).await {
                Ok(outcome) => {
                    self.diagnostics.record_outcome(outcome);
                    self.log.log_delivered(&record.register, outcome).await;
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    report.failed += 1;
                    self.diagnostics
                        .failed_deliveries
                        .fetch_add(1, Ordering::Relaxed);
                    self.diagnostics.set_last_error(e.to_string());
                    self.log
                        .log_delivery_failed(&record.register, e.to_string())
                        .await;
                }
            }
        }

        report
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    ///
    /// The signal is checked before every read and during the sleep; a
    /// cycle already dispatching runs to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DiagnosticsSnapshot {
        let interval = self.descriptor.poll_interval;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await;

            self.set_state(PollerState::Sleeping).await;
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.set_state(PollerState::Stopped).await;
        self.log.log_stopped(self.cycle).await;
        self.diagnostics.snapshot()
    }
}
