//! Delivery sinks.
//!
//! The [`PersistenceCascade`] routes every record through the two
//! [`RecordStore`](crate::store::RecordStore) tiers, falling back to an
//! append-only [`FallbackFile`] and an operator alert when both are down.

pub mod alert;
pub mod cascade;
pub mod fallback;

pub use alert::{Alert, AlertNotifier, LogNotifier};
#[cfg(feature = "webhook")]
pub use alert::WebhookNotifier;
pub use cascade::{CascadeBuilder, PersistenceCascade, SinkHealth};
pub use fallback::{read_records, FallbackFile};
