//! Relay runtime.
//!
//! Configuration, construction and the per-host polling tasks.

pub mod config;
pub mod factory;
pub mod poller;
pub mod supervisor;

pub use config::{HostConfig, HostDescriptor, RelayConfig};
pub use poller::{CycleReport, DiagnosticsSnapshot, HostDiagnostics, HostPoller, RelayContext};
pub use supervisor::{HostSummary, SkippedHost, Supervisor};
