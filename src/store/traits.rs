//! RecordStore trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::core::data::DeliveryRecord;
use crate::core::error::Result;

/// Default time allowed to open a store connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default time allowed for one stored-procedure call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters of one stored-procedure call.
///
/// Positional order is `(host, tag_name, register, numeric_value, text_value)`;
/// exactly one of the two value columns is set.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreParams {
    /// Controller host
    pub host: String,
    /// Tag name
    pub tag_name: String,
    /// Register address
    pub register: String,
    /// Numeric column
    pub numeric_value: Option<f64>,
    /// Text column
    pub text_value: Option<String>,
}

impl From<&DeliveryRecord> for StoreParams {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            host: record.host.clone(),
            tag_name: record.tag_name.clone(),
            register: record.register.clone(),
            numeric_value: record.numeric_value(),
            text_value: record.text_value().map(str::to_string),
        }
    }
}

/// Trait for the database tiers of the persistence cascade.
///
/// A store hands out one connection per write; nothing is pooled. The
/// cascade bounds `connect` by [`connect_timeout`](Self::connect_timeout)
/// and each `call` by [`operation_timeout`](Self::operation_timeout).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store name used in errors and logs (e.g. `"remote"`).
    fn name(&self) -> &str;

    /// Stored procedure invoked for every record.
    fn procedure(&self) -> &str;

    /// Time allowed to open a connection.
    fn connect_timeout(&self) -> Duration {
        DEFAULT_CONNECT_TIMEOUT
    }

    /// Time allowed for one call.
    fn operation_timeout(&self) -> Duration {
        DEFAULT_OPERATION_TIMEOUT
    }

    /// Open a fresh connection.
    ///
    /// Fails with [`RelayError::Connection`](crate::RelayError::Connection)
    /// if the store is unreachable.
    async fn connect(&self) -> Result<Box<dyn StoreConnection>>;

    /// Check reachability by opening and immediately closing a connection.
    async fn probe(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        if let Err(e) = conn.close().await {
            tracing::debug!(store = %self.name(), error = %e, "Probe connection close failed");
        }
        Ok(())
    }
}

/// One open store connection.
///
/// Dropping a connection releases it; `close` does so explicitly and is
/// idempotent.
#[async_trait]
pub trait StoreConnection: Send {
    /// Invoke `procedure` with the record parameters.
    ///
    /// Fails with [`RelayError::Write`](crate::RelayError::Write) if the store
    /// rejects the call.
    async fn call(&mut self, procedure: &str, params: &StoreParams) -> Result<()>;

    /// Release the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Check that a procedure name is a plain, optionally schema-qualified SQL
/// identifier (`[A-Za-z_][A-Za-z0-9_.]*`).
///
/// Procedure names are interpolated into the `CALL` statement, so nothing
/// else is accepted.
pub fn is_valid_procedure_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
