//! Append-only CSV fallback file.
//!
//! Row layout, no header:
//!
//! ```text
//! host,tag_name,register,numeric_value,text_value,timestamp
//! 10.0.0.1,D10,D10,42.0,,2024-05-01T12:00:00.123456Z
//! 10.0.0.1,M0,M0,,RUN,2024-05-01T12:00:00.123456Z
//! ```
//!
//! A non-empty `numeric_value` marks a numeric record; otherwise the record
//! is textual (an empty text value stays empty). Timestamps are RFC 3339 UTC
//! with every sub-second digit the capture time carried.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::data::{DeliveryRecord, RecordValue};
use crate::core::error::{RelayError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct FallbackRow {
    host: String,
    tag_name: String,
    register: String,
    numeric_value: Option<f64>,
    text_value: Option<String>,
    timestamp: String,
}

impl From<&DeliveryRecord> for FallbackRow {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            host: record.host.clone(),
            tag_name: record.tag_name.clone(),
            register: record.register.clone(),
            numeric_value: record.numeric_value(),
            text_value: record.text_value().map(str::to_string),
            timestamp: record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

impl TryFrom<FallbackRow> for DeliveryRecord {
    type Error = RelayError;

    fn try_from(row: FallbackRow) -> Result<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| {
                RelayError::Fallback(format!("invalid timestamp '{}': {}", row.timestamp, e))
            })?
            .with_timezone(&Utc);

        let value = match row.numeric_value {
            Some(v) => RecordValue::Numeric(v),
            None => RecordValue::Text(row.text_value.unwrap_or_default()),
        };

        Ok(DeliveryRecord::new(
            row.host,
            row.tag_name,
            row.register,
            value,
            timestamp,
        ))
    }
}

/// Durable last-resort sink.
///
/// Shared by every host poller. Appends are serialized: the lock is held
/// for exactly one open, write, flush and fsync. The file is never
/// truncated or rewritten.
#[derive(Debug, Clone)]
pub struct FallbackFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FallbackFile {
    /// Create a handle for `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and sync it to disk.
    pub async fn append(&self, record: &DeliveryRecord) -> Result<()> {
        let row = FallbackRow::from(record);
        let path = self.path.clone();

        let _guard = self.lock.lock().await;
        tokio::task::spawn_blocking(move || append_row(&path, &row))
            .await
            .map_err(|e| RelayError::Fallback(format!("append task failed: {}", e)))?
    }

    /// Read back every record in the file.
    pub fn read_records(&self) -> Result<Vec<DeliveryRecord>> {
        read_records(&self.path)
    }
}

fn append_row(path: &Path, row: &FallbackRow) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;

    let file = writer
        .into_inner()
        .map_err(|e| RelayError::Io(e.into_error()))?;
    file.sync_data()?;
    Ok(())
}

/// Parse a fallback file back into records, in file order.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeliveryRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path.as_ref())?;

    reader
        .deserialize::<FallbackRow>()
        .map(|row| DeliveryRecord::try_from(row?))
        .collect()
}
