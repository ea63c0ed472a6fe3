//! Core traits for device access.
//!
//! The controller wire protocol is not part of this crate. A device client
//! is anything that can read a [`TagSet`] from one controller and either
//! return typed values or fail with a communication error.
//!
//! ```text
//! DeviceConnector  // factory: DeviceTarget -> Box<dyn DeviceClient>
//! └── DeviceClient // read(TagSet) -> Vec<TagValue>, one per host
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::data::TagValue;
use crate::core::error::Result;
use crate::core::tag::TagSet;

/// Identity of one monitored controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTarget {
    /// IP address or hostname of the controller's Ethernet module
    pub host: String,

    /// Port of the controller socket
    pub port: u16,

    /// Controller model/family (e.g. `"iQ-R"`)
    pub controller_type: String,

    /// Communication encoding understood by the client (e.g. `"binary"`)
    #[serde(default = "default_comm_type")]
    pub comm_type: String,
}

fn default_comm_type() -> String {
    "binary".to_string()
}

impl DeviceTarget {
    /// Create a target with the default binary communication type.
    pub fn new(host: impl Into<String>, port: u16, controller_type: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            controller_type: controller_type.into(),
            comm_type: default_comm_type(),
        }
    }

    /// Set the communication type.
    #[must_use]
    pub fn with_comm_type(mut self, comm_type: impl Into<String>) -> Self {
        self.comm_type = comm_type.into();
        self
    }

    /// `host:port` endpoint string.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.controller_type)
    }
}

/// Client for one controller.
///
/// Implementations own their connection state; a poller holds exactly one
/// client and calls it sequentially. `read` should return one value per tag
/// it could read, in tag order. A whole-read failure must be reported as
/// [`RelayError::CommunicationTimeout`](crate::RelayError::CommunicationTimeout)
/// or [`RelayError::Communication`](crate::RelayError::Communication).
#[async_trait]
pub trait DeviceClient: Send {
    /// The controller this client talks to.
    fn target(&self) -> &DeviceTarget;

    /// Read every tag in the set.
    async fn read(&mut self, tags: &TagSet) -> Result<Vec<TagValue>>;
}

/// Factory that creates a [`DeviceClient`] for a target.
pub trait DeviceConnector: Send + Sync {
    /// Create a client for `target`.
    ///
    /// Fails with a configuration error if the controller type is unsupported.
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceClient>>;
}

impl<F> DeviceConnector for F
where
    F: Fn(&DeviceTarget) -> Result<Box<dyn DeviceClient>> + Send + Sync,
{
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceClient>> {
        self(target)
    }
}

/// State of a host poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    /// Created, not yet polling.
    #[default]
    Idle,

    /// Reading from the controller.
    Polling,

    /// Delivering the readings of the current cycle.
    Dispatching,

    /// Waiting for the next cycle.
    Sleeping,

    /// Stopped by a shutdown signal.
    Stopped,
}

impl PollerState {
    /// Check if the poller has terminated.
    #[inline]
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Polling => "Polling",
            Self::Dispatching => "Dispatching",
            Self::Sleeping => "Sleeping",
            Self::Stopped => "Stopped",
        };
        write!(f, "{}", s)
    }
}
