//! Virtual controller for dry runs and tests.
//!
//! A virtual device does not connect to any hardware. It keeps a register
//! table in memory, answers reads from it, and can be told to fail.
//!
//! # Architecture
//!
//! `VirtualDevice` owns a shared [`DeviceState`]; a [`VirtualDeviceHandle`]
//! holds the same state so a test (or an embedding application) can seed
//! values and inject failures while a poller owns the device.
//!
//! # Example
//!
//! ```rust,ignore
//! use tagrelay::protocols::virtual_device::VirtualDevice;
//!
//! let device = VirtualDevice::new(DeviceTarget::new("sim-1", 5002, "virtual"));
//! let handle = device.handle();
//! handle.set_value("D10", 42);
//! handle.fail_next(1, FailureMode::Timeout);
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::data::{RawValue, TagValue};
use crate::core::error::{RelayError, Result};
use crate::core::tag::{TagSet, TagType};
use crate::core::traits::{DeviceClient, DeviceConnector, DeviceTarget};

/// Controller type name served by [`VirtualConnector`].
pub const VIRTUAL_CONTROLLER: &str = "virtual";

/// Virtual device configuration.
#[derive(Debug, Clone)]
pub struct VirtualDeviceConfig {
    /// Simulated read latency.
    pub latency: Duration,

    /// Advance every numeric register after each successful read.
    pub auto_advance: bool,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            auto_advance: false,
        }
    }
}

impl VirtualDeviceConfig {
    /// Set simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Enable or disable auto-advance.
    pub fn with_auto_advance(mut self, enable: bool) -> Self {
        self.auto_advance = enable;
        self
    }
}

/// How an injected read failure manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureMode {
    /// Return a communication timeout immediately.
    Timeout,
    /// Return a communication error with this message.
    Error(String),
    /// Never answer; the caller's timeout must fire.
    Hang,
}

/// Register table and failure switches shared between device and handle.
#[derive(Debug, Default)]
pub struct DeviceState {
    values: DashMap<String, RawValue>,
    tag_errors: DashMap<String, String>,
    failure: RwLock<Option<FailureMode>>,
    remaining_failures: AtomicU32,
    reads: AtomicU64,
}

/// Handle for seeding and steering a [`VirtualDevice`].
#[derive(Debug, Clone)]
pub struct VirtualDeviceHandle {
    state: Arc<DeviceState>,
}

impl VirtualDeviceHandle {
    /// Seed a register value.
    pub fn set_value(&self, register: impl Into<String>, value: impl Into<RawValue>) {
        self.state.values.insert(register.into(), value.into());
    }

    /// Current value of a register, if seeded or read.
    pub fn value(&self, register: &str) -> Option<RawValue> {
        self.state.values.get(register).map(|v| v.value().clone())
    }

    /// Make the device report an error for one register.
    pub fn set_tag_error(&self, register: impl Into<String>, error: impl Into<String>) {
        self.state.tag_errors.insert(register.into(), error.into());
    }

    /// Fail the next `count` reads.
    pub fn fail_next(&self, count: u32, mode: FailureMode) {
        self.set_failure(Some(mode));
        self.state.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every read until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, mode: FailureMode) {
        self.fail_next(u32::MAX, mode);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.set_failure(None);
        self.state.remaining_failures.store(0, Ordering::SeqCst);
        self.state.tag_errors.clear();
    }

    /// Number of reads attempted, failed ones included.
    pub fn reads(&self) -> u64 {
        self.state.reads.load(Ordering::SeqCst)
    }

    /// Advance every numeric register by one step.
    ///
    /// Integers and floats increase by one and bits toggle. Text is left
    /// as is.
    pub fn advance(&self) {
        for mut entry in self.state.values.iter_mut() {
            let next = match entry.value() {
                RawValue::Bit(b) => RawValue::Bit(!b),
                RawValue::Integer(i) => RawValue::Integer(i.wrapping_add(1)),
                RawValue::Float(f) => RawValue::Float(f + 1.0),
                RawValue::Text(_) => continue,
            };
            *entry.value_mut() = next;
        }
    }

    fn set_failure(&self, mode: Option<FailureMode>) {
        match self.state.failure.write() {
            Ok(mut guard) => *guard = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
    }

    fn take_failure(&self) -> Option<FailureMode> {
        let remaining = self.state.remaining_failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        if remaining != u32::MAX {
            self.state
                .remaining_failures
                .store(remaining - 1, Ordering::SeqCst);
        }
        match self.state.failure.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Simulated controller.
pub struct VirtualDevice {
    target: DeviceTarget,
    config: VirtualDeviceConfig,
    handle: VirtualDeviceHandle,
}

impl VirtualDevice {
    /// Create a device with default configuration.
    pub fn new(target: DeviceTarget) -> Self {
        Self::with_config(target, VirtualDeviceConfig::default())
    }

    /// Create a device with explicit configuration.
    pub fn with_config(target: DeviceTarget, config: VirtualDeviceConfig) -> Self {
        Self {
            target,
            config,
            handle: VirtualDeviceHandle {
                state: Arc::new(DeviceState::default()),
            },
        }
    }

    /// Get a handle to the register table.
    pub fn handle(&self) -> VirtualDeviceHandle {
        self.handle.clone()
    }
}

/// Zero value for an unseeded register.
fn default_value(tag_type: TagType) -> RawValue {
    match tag_type {
        TagType::Bit => RawValue::Bit(false),
        TagType::Float | TagType::Double => RawValue::Float(0.0),
        _ => RawValue::Integer(0),
    }
}

#[async_trait]
impl DeviceClient for VirtualDevice {
    fn target(&self) -> &DeviceTarget {
        &self.target
    }

    async fn read(&mut self, tags: &TagSet) -> Result<Vec<TagValue>> {
        let state = &self.handle.state;
        state.reads.fetch_add(1, Ordering::SeqCst);

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        match self.handle.take_failure() {
            Some(FailureMode::Timeout) => {
                return Err(RelayError::CommunicationTimeout {
                    host: self.target.host.clone(),
                })
            }
            Some(FailureMode::Error(message)) => {
                return Err(RelayError::communication(&self.target.host, message))
            }
            Some(FailureMode::Hang) => {
                std::future::pending::<()>().await;
            }
            None => {}
        }

        let values = tags
            .iter()
            .map(|tag| {
                let value = state
                    .values
                    .entry(tag.register().to_string())
                    .or_insert_with(|| default_value(tag.tag_type()))
                    .value()
                    .clone();
                let mut tv = TagValue::new(tag.register(), tag.tag_type(), value);
                if let Some(err) = state.tag_errors.get(tag.register()) {
                    tv = tv.with_error(err.value().clone());
                }
                tv
            })
            .collect();

        if self.config.auto_advance {
            self.handle.advance();
        }

        Ok(values)
    }
}

/// Connector that serves the `virtual` controller type.
///
/// Handles of every device it creates are kept by host, so the register
/// tables stay reachable after the devices move into their pollers.
#[derive(Default)]
pub struct VirtualConnector {
    config: VirtualDeviceConfig,
    handles: DashMap<String, VirtualDeviceHandle>,
}

impl VirtualConnector {
    /// Create a connector whose devices use `config`.
    pub fn new(config: VirtualDeviceConfig) -> Self {
        Self {
            config,
            handles: DashMap::new(),
        }
    }

    /// Handle of the device created for `host`.
    pub fn handle(&self, host: &str) -> Option<VirtualDeviceHandle> {
        self.handles.get(host).map(|h| h.value().clone())
    }
}

impl DeviceConnector for VirtualConnector {
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceClient>> {
        if !target.controller_type.eq_ignore_ascii_case(VIRTUAL_CONTROLLER) {
            return Err(RelayError::Config(format!(
                "unsupported controller type '{}' for host {}",
                target.controller_type, target.host
            )));
        }

        let handle = self
            .handles
            .entry(target.host.clone())
            .or_insert_with(|| VirtualDeviceHandle {
                state: Arc::new(DeviceState::default()),
            })
            .value()
            .clone();

        Ok(Box::new(VirtualDevice {
            target: target.clone(),
            config: self.config.clone(),
            handle,
        }))
    }
}
