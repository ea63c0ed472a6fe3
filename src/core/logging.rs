//! Relay logging infrastructure.
//!
//! Host pollers never write to a global logger directly. Each poller gets a
//! [`LogContext`] built once at startup from a shared [`RelayLogHandler`]
//! and a [`RelayLogConfig`] filter; every skipped cycle, delivery and tier
//! used flows through it as a [`RelayLogEvent`].
//!
//! # Example
//!
//! ```ignore
//! use tagrelay::core::logging::{LogContext, RelayLogConfig, TracingLogHandler};
//!
//! let ctx = LogContext::new("192.168.106.40")
//!     .with_handler(Arc::new(TracingLogHandler))
//!     .with_config(RelayLogConfig::all());
//! ctx.log_cycle_skipped("communication timeout").await;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::data::DeliveryOutcome;
use crate::core::traits::PollerState;

const DEFAULT_LOG_FILTER: &str = "info,tagrelay=info";
const VERBOSE_LOG_FILTER: &str = "info,tagrelay=debug";

// ============================================================================
// Subscriber setup
// ============================================================================

/// Process-wide tracing output settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSettings {
    /// Enable debug output for this crate.
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

/// Install the global tracing subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over the built-in filters. Returns an error
/// string if a subscriber was already installed.
pub fn init_tracing(settings: LogSettings) -> std::result::Result<(), String> {
    let fallback = if settings.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if settings.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| e.to_string())
}

// ============================================================================
// Relay Log Event
// ============================================================================

/// Relay log event.
///
/// External applications implement [`RelayLogHandler`] to receive these.
#[derive(Debug, Clone)]
pub enum RelayLogEvent {
    /// A poll cycle started.
    CycleStarted {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Cycle sequence number (starting at 1).
        cycle: u64,
        /// Number of tags requested.
        tag_count: usize,
    },

    /// The controller read completed.
    ReadCompleted {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Number of values returned.
        value_count: usize,
        /// Read duration in milliseconds.
        duration_ms: u64,
    },

    /// The controller read failed and the cycle was skipped.
    CycleSkipped {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Failure description.
        error: String,
    },

    /// The device reported an error for one tag; the value was not delivered.
    TagError {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Register address.
        register: String,
        /// Device error.
        error: String,
    },

    /// A record was delivered.
    Delivered {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Register address.
        register: String,
        /// Sink used and whether an alert was attempted.
        outcome: DeliveryOutcome,
    },

    /// A record could not be persisted anywhere.
    DeliveryFailed {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Register address.
        register: String,
        /// Failure description.
        error: String,
    },

    /// Poller state changed.
    StateChanged {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Previous state.
        old_state: PollerState,
        /// New state.
        new_state: PollerState,
    },

    /// The poller stopped.
    Stopped {
        /// Event timestamp.
        timestamp: DateTime<Utc>,
        /// Number of cycles run.
        cycles: u64,
    },
}

impl RelayLogEvent {
    /// Get the event timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::CycleStarted { timestamp, .. } => *timestamp,
            Self::ReadCompleted { timestamp, .. } => *timestamp,
            Self::CycleSkipped { timestamp, .. } => *timestamp,
            Self::TagError { timestamp, .. } => *timestamp,
            Self::Delivered { timestamp, .. } => *timestamp,
            Self::DeliveryFailed { timestamp, .. } => *timestamp,
            Self::StateChanged { timestamp, .. } => *timestamp,
            Self::Stopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the filter category of this event.
    pub fn event_type(&self) -> LogEventType {
        match self {
            Self::CycleStarted { .. } => LogEventType::Cycle,
            Self::ReadCompleted { .. } => LogEventType::Read,
            Self::CycleSkipped { .. } => LogEventType::CycleSkipped,
            Self::TagError { .. } => LogEventType::TagError,
            Self::Delivered { .. } => LogEventType::Delivery,
            Self::DeliveryFailed { .. } => LogEventType::DeliveryFailed,
            Self::StateChanged { .. } => LogEventType::StateChanged,
            Self::Stopped { .. } => LogEventType::Lifecycle,
        }
    }
}

// ============================================================================
// Log Event Type (for filtering)
// ============================================================================

/// Log event type for filtering configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventType {
    /// Cycle start events.
    Cycle,
    /// Completed reads.
    Read,
    /// Skipped cycles.
    CycleSkipped,
    /// Per-tag device errors.
    TagError,
    /// Delivered records.
    Delivery,
    /// Records that could not be persisted.
    DeliveryFailed,
    /// Poller state changes.
    StateChanged,
    /// Poller stop.
    Lifecycle,
}

impl LogEventType {
    /// Get all event types.
    pub fn all() -> HashSet<LogEventType> {
        use LogEventType::*;
        [
            Cycle,
            Read,
            CycleSkipped,
            TagError,
            Delivery,
            DeliveryFailed,
            StateChanged,
            Lifecycle,
        ]
        .into_iter()
        .collect()
    }

    /// Get default event types (excludes high-frequency events).
    pub fn default_set() -> HashSet<LogEventType> {
        use LogEventType::*;
        [CycleSkipped, TagError, Delivery, DeliveryFailed, Lifecycle]
            .into_iter()
            .collect()
    }
}

// ============================================================================
// Relay Log Config
// ============================================================================

/// Relay logging configuration.
///
/// Controls which events reach the handler.
#[derive(Debug, Clone)]
pub struct RelayLogConfig {
    /// Enabled event types.
    enabled_events: HashSet<LogEventType>,
    /// Log deliveries that landed on the remote store.
    log_primary_deliveries: bool,
}

impl Default for RelayLogConfig {
    fn default() -> Self {
        Self {
            enabled_events: LogEventType::default_set(),
            log_primary_deliveries: false,
        }
    }
}

impl RelayLogConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration that logs everything.
    pub fn all() -> Self {
        Self {
            enabled_events: LogEventType::all(),
            log_primary_deliveries: true,
        }
    }

    /// Create a disabled configuration.
    pub fn disabled() -> Self {
        Self {
            enabled_events: HashSet::new(),
            ..Default::default()
        }
    }

    /// Enable a specific event type.
    #[must_use]
    pub fn enable_event(mut self, event_type: LogEventType) -> Self {
        self.enabled_events.insert(event_type);
        self
    }

    /// Disable a specific event type.
    #[must_use]
    pub fn disable_event(mut self, event_type: LogEventType) -> Self {
        self.enabled_events.remove(&event_type);
        self
    }

    /// Set whether deliveries to the remote store are logged.
    #[must_use]
    pub fn with_primary_deliveries(mut self, enable: bool) -> Self {
        self.log_primary_deliveries = enable;
        self
    }

    /// Check if an event type is enabled.
    pub fn is_enabled(&self, event_type: LogEventType) -> bool {
        self.enabled_events.contains(&event_type)
    }

    /// Check if an event should be logged based on configuration.
    ///
    /// Deliveries to the remote store are routine and only pass when
    /// enabled explicitly; failovers always pass.
    pub fn should_log(&self, event: &RelayLogEvent) -> bool {
        if !self.is_enabled(event.event_type()) {
            return false;
        }
        match event {
            RelayLogEvent::Delivered { outcome, .. } => {
                self.log_primary_deliveries
                    || outcome.sink != crate::core::data::SinkKind::Remote
            }
            _ => true,
        }
    }
}

// ============================================================================
// Relay Log Handler Trait
// ============================================================================

/// Relay log handler trait.
///
/// Implement this trait to receive log events from host pollers.
#[async_trait]
pub trait RelayLogHandler: Send + Sync {
    /// Handle a log event emitted for `host`.
    async fn on_log(&self, host: &str, event: RelayLogEvent);
}

// ============================================================================
// Built-in Log Handlers
// ============================================================================

/// No-op log handler that discards all events.
pub struct NoopLogHandler;

#[async_trait]
impl RelayLogHandler for NoopLogHandler {
    async fn on_log(&self, _host: &str, _event: RelayLogEvent) {}
}

/// Composite handler that forwards to multiple handlers.
pub struct CompositeLogHandler {
    handlers: Vec<Arc<dyn RelayLogHandler>>,
}

impl CompositeLogHandler {
    /// Create an empty composite handler.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler (builder pattern).
    #[must_use]
    pub fn add(mut self, handler: Arc<dyn RelayLogHandler>) -> Self {
        self.handlers.push(handler);
        self
    }
}

impl Default for CompositeLogHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayLogHandler for CompositeLogHandler {
    async fn on_log(&self, host: &str, event: RelayLogEvent) {
        for handler in &self.handlers {
            handler.on_log(host, event.clone()).await;
        }
    }
}

/// Log handler that forwards events to `tracing`.
pub struct TracingLogHandler;

#[async_trait]
impl RelayLogHandler for TracingLogHandler {
    async fn on_log(&self, host: &str, event: RelayLogEvent) {
        use tracing::{debug, error, info, trace, warn};

        match &event {
            RelayLogEvent::CycleStarted {
                cycle, tag_count, ..
            } => {
                trace!(host = %host, cycle = cycle, tag_count = tag_count, "Poll cycle started");
            }
            RelayLogEvent::ReadCompleted {
                value_count,
                duration_ms,
                ..
            } => {
                debug!(
                    host = %host,
                    value_count = value_count,
                    duration_ms = duration_ms,
                    "Controller read completed"
                );
            }
            RelayLogEvent::CycleSkipped {
                timestamp, error, ..
            } => {
                warn!(
                    host = %host,
                    at = %timestamp.to_rfc3339(),
                    error = %error,
                    "Poll cycle skipped"
                );
            }
            RelayLogEvent::TagError {
                register, error, ..
            } => {
                warn!(host = %host, register = %register, error = %error, "Device reported tag error");
            }
            RelayLogEvent::Delivered {
                register, outcome, ..
            } => {
                if outcome.alerted {
                    warn!(
                        host = %host,
                        register = %register,
                        sink = %outcome.sink,
                        "Record written to fallback file"
                    );
                } else {
                    info!(
                        host = %host,
                        register = %register,
                        sink = %outcome.sink,
                        "Record delivered"
                    );
                }
            }
            RelayLogEvent::DeliveryFailed {
                register, error, ..
            } => {
                error!(host = %host, register = %register, error = %error, "Record could not be persisted");
            }
            RelayLogEvent::StateChanged {
                old_state,
                new_state,
                ..
            } => {
                trace!(
                    host = %host,
                    old_state = %old_state,
                    new_state = %new_state,
                    "Poller state changed"
                );
            }
            RelayLogEvent::Stopped { cycles, .. } => {
                info!(host = %host, cycles = cycles, "Poller stopped");
            }
        }
    }
}

// ============================================================================
// Log Context
// ============================================================================

/// Logging context owned by one host poller.
#[derive(Clone)]
pub struct LogContext {
    host: String,
    handler: Option<Arc<dyn RelayLogHandler>>,
    config: RelayLogConfig,
}

impl LogContext {
    /// Create a context with no handler attached.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            handler: None,
            config: RelayLogConfig::default(),
        }
    }

    /// Set the log handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn RelayLogHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the log configuration.
    #[must_use]
    pub fn with_config(mut self, config: RelayLogConfig) -> Self {
        self.config = config;
        self
    }

    /// Host this context logs for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Current configuration.
    pub fn config(&self) -> &RelayLogConfig {
        &self.config
    }

    /// Log an event if a handler is set and the config allows it.
    pub async fn log(&self, event: RelayLogEvent) {
        if let Some(handler) = &self.handler {
            if self.config.should_log(&event) {
                handler.on_log(&self.host, event).await;
            }
        }
    }

    /// Log the start of a cycle.
    pub async fn log_cycle_started(&self, cycle: u64, tag_count: usize) {
        self.log(RelayLogEvent::CycleStarted {
            timestamp: Utc::now(),
            cycle,
            tag_count,
        })
        .await;
    }

    /// Log a completed read.
    pub async fn log_read_completed(&self, value_count: usize, duration_ms: u64) {
        self.log(RelayLogEvent::ReadCompleted {
            timestamp: Utc::now(),
            value_count,
            duration_ms,
        })
        .await;
    }

    /// Log a skipped cycle.
    pub async fn log_cycle_skipped(&self, error: impl Into<String>) {
        self.log(RelayLogEvent::CycleSkipped {
            timestamp: Utc::now(),
            error: error.into(),
        })
        .await;
    }

    /// Log a per-tag device error.
    pub async fn log_tag_error(&self, register: impl Into<String>, error: impl Into<String>) {
        self.log(RelayLogEvent::TagError {
            timestamp: Utc::now(),
            register: register.into(),
            error: error.into(),
        })
        .await;
    }

    /// Log a delivered record.
    pub async fn log_delivered(&self, register: impl Into<String>, outcome: DeliveryOutcome) {
        self.log(RelayLogEvent::Delivered {
            timestamp: Utc::now(),
            register: register.into(),
            outcome,
        })
        .await;
    }

    /// Log a record that could not be persisted.
    pub async fn log_delivery_failed(&self, register: impl Into<String>, error: impl Into<String>) {
        self.log(RelayLogEvent::DeliveryFailed {
            timestamp: Utc::now(),
            register: register.into(),
            error: error.into(),
        })
        .await;
    }

    /// Log a state transition.
    pub async fn log_state_changed(&self, old_state: PollerState, new_state: PollerState) {
        self.log(RelayLogEvent::StateChanged {
            timestamp: Utc::now(),
            old_state,
            new_state,
        })
        .await;
    }

    /// Log the poller stopping.
    pub async fn log_stopped(&self, cycles: u64) {
        self.log(RelayLogEvent::Stopped {
            timestamp: Utc::now(),
            cycles,
        })
        .await;
    }
}

// ============================================================================
// Tests
// ============================================================================
