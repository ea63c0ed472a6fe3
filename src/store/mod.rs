//! Record store abstraction layer.
//!
//! This module provides the `RecordStore` trait for the two database tiers
//! of the persistence cascade, allowing the relay to work with different
//! backends:
//!
//! - `MemoryStore`: In-process store using DashMap (tests and dry runs)
//! - `PgStore`: PostgreSQL via sqlx (feature `postgres`)
//!
//! # Example
//!
//! ```rust,ignore
//! use tagrelay::store::{MemoryStore, RecordStore};
//!
//! let store = MemoryStore::new("local");
//! store.probe().await?;
//! ```

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use memory::{MemoryStore, RecordedCall};
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use traits::{is_valid_procedure_name, RecordStore, StoreConnection, StoreParams};
