//! # tagrelay
//!
//! Store-and-forward relay for industrial controller tag readings.
//!
//! Each configured controller is polled on its own task. Every value read
//! is classified as numeric or textual and delivered through a tiered
//! persistence cascade, so that no reading is lost while the primary data
//! store is down:
//!
//! ```text
//! remote store ──fail──→ local store ──fail──→ fallback CSV file + operator alert
//! ```
//!
//! ## Features
//!
//! - **Typed tags**: register types resolved once, at startup, into a closed enum
//! - **Independent hosts**: one polling task per controller, no shared state but the cascade
//! - **Bounded I/O**: every device read and store call has a timeout
//! - **Feature Gated**: `postgres` store and `webhook` alerts are optional
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tagrelay::prelude::*;
//!
//! let config = RelayConfig::load("relay.toml")?;
//! let mut supervisor = Supervisor::from_config(&config, None)?;
//! supervisor.start(&config);
//! supervisor.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! ```
//!
//! The controller protocol itself is not part of this crate: implement
//! [`DeviceClient`] and [`DeviceConnector`] for your controller family, or
//! use the built-in `virtual` controller for dry runs.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod protocols;
pub mod relay;
pub mod sink;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        classify::{classify, Classification},
        data::*,
        error::{RelayError, Result},
        tag::{resolve, TagSet, TagSpec, TagType},
        traits::*,
    };
    pub use crate::relay::{HostPoller, RelayConfig, RelayContext, Supervisor};
    pub use crate::sink::{AlertNotifier, PersistenceCascade};
    pub use crate::store::{MemoryStore, RecordStore};
}

// Re-export core types at crate root for convenience
pub use crate::core::data::{DeliveryOutcome, DeliveryRecord, RawValue, RecordValue, SinkKind};
pub use crate::core::error::{RelayError, Result};
pub use crate::core::tag::{TagSet, TagType};
pub use crate::core::traits::{DeviceClient, DeviceConnector, DeviceTarget, PollerState};

// Re-export sink and store types
pub use crate::sink::PersistenceCascade;
pub use crate::store::{MemoryStore, RecordStore};
