//! Error types for the relay.
//!
//! A single error enum covers every failure the pipeline distinguishes.
//! Recovery is decided by category:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | Configuration | `Configuration`, `Config` | fatal to the affected host at startup |
//! | Communication | `CommunicationTimeout`, `Communication` | skip the poll cycle |
//! | Store | `Connection`, `Write` | cascade to the next tier |
//! | Alert | `AlertDelivery` | logged only |
//! | Fallback | `Fallback`, `Io`, `Csv` | logged; the record could not be persisted |

use thiserror::Error;

/// Result type alias using [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors produced by the relay pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A tag mapping entry could not be resolved.
    #[error("configuration error for register '{registry}': {message}")]
    Configuration {
        /// Offending register address.
        registry: String,
        /// What was wrong with it.
        message: String,
    },

    /// Any other invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The controller did not answer within the communication timeout.
    #[error("communication timeout for host {host}")]
    CommunicationTimeout {
        /// Controller host.
        host: String,
    },

    /// The controller read failed for a reason other than a timeout.
    #[error("communication error with host {host}: {message}")]
    Communication {
        /// Controller host.
        host: String,
        /// Failure description.
        message: String,
    },

    /// A record store could not be reached.
    #[error("store '{store}' unreachable: {message}")]
    Connection {
        /// Store name.
        store: String,
        /// Failure description.
        message: String,
    },

    /// A record store was reachable but rejected the write.
    #[error("store '{store}' rejected write: {message}")]
    Write {
        /// Store name.
        store: String,
        /// Failure description.
        message: String,
    },

    /// An operator alert could not be delivered.
    #[error("alert delivery failed: {0}")]
    AlertDelivery(String),

    /// The fallback file could not be appended to or read.
    #[error("fallback file error: {0}")]
    Fallback(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl RelayError {
    /// Create a tag mapping error for `registry`.
    pub fn configuration(registry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Create a store connection error.
    pub fn connection(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a store write error.
    pub fn write(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a controller communication error.
    pub fn communication(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Communication {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Config(_))
    }

    /// Check if this is a controller communication error.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            Self::CommunicationTimeout { .. } | Self::Communication { .. }
        )
    }

    /// Check if this is a record store failure (unreachable or rejected).
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Write { .. })
    }
}
