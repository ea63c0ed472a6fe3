//! Data types for the relay.
//!
//! Values flow through three shapes during one poll cycle:
//!
//! - [`TagValue`]: what the device client returned for one register
//! - [`TagReading`]: that value stamped with host and capture time
//! - [`DeliveryRecord`]: the persisted unit handed to the cascade
//!
//! None of them outlive the cycle that created them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::classify::classify;
use crate::core::tag::TagType;

/// A raw value as returned by a device client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Boolean value (BIT registers)
    Bit(bool),

    /// Integer value (word registers)
    Integer(i64),

    /// Floating-point value
    Float(f64),

    /// Textual value
    Text(String),
}

impl RawValue {
    /// Try to get the value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bit(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bit(v) => write!(f, "{}", u8::from(*v)),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        Self::Bit(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<i16> for RawValue {
    fn from(v: i16) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u32> for RawValue {
    fn from(v: u32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u16> for RawValue {
    fn from(v: u16) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for RawValue {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One register value returned by a device read.
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    /// Register address
    pub register: String,

    /// Declared type of the register
    pub tag_type: TagType,

    /// The value read
    pub value: RawValue,

    /// Per-tag error reported by the device, if any
    pub error: Option<String>,
}

impl TagValue {
    /// Create a value without a device error.
    pub fn new(register: impl Into<String>, tag_type: TagType, value: impl Into<RawValue>) -> Self {
        Self {
            register: register.into(),
            tag_type,
            value: value.into(),
            error: None,
        }
    }

    /// Attach a per-tag device error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A tag value captured from a specific host at a specific time.
#[derive(Debug, Clone, PartialEq)]
pub struct TagReading {
    /// Controller host
    pub host: String,

    /// Register address
    pub register: String,

    /// Declared type of the register
    pub raw_type: TagType,

    /// The value read
    pub value: RawValue,

    /// When the poll cycle captured the value
    pub captured_at: DateTime<Utc>,

    /// Per-tag communication error, if the device reported one
    pub communication_error: Option<String>,
}

impl TagReading {
    /// Stamp a device value with its host and capture time.
    pub fn from_tag_value(host: impl Into<String>, value: TagValue, captured_at: DateTime<Utc>) -> Self {
        Self {
            host: host.into(),
            register: value.register,
            raw_type: value.tag_type,
            value: value.value,
            captured_at,
            communication_error: value.error,
        }
    }
}

/// The value carried by a [`DeliveryRecord`].
///
/// Exactly one of numeric or text is present by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    /// Numeric reading
    Numeric(f64),

    /// Textual reading
    Text(String),
}

/// The persisted unit: one reading, routed through the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Controller host
    pub host: String,

    /// Tag name
    pub tag_name: String,

    /// Register address
    pub register: String,

    /// Numeric or textual value
    pub value: RecordValue,

    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Create a record from its parts.
    pub fn new(
        host: impl Into<String>,
        tag_name: impl Into<String>,
        register: impl Into<String>,
        value: RecordValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            host: host.into(),
            tag_name: tag_name.into(),
            register: register.into(),
            value,
            timestamp,
        }
    }

    /// Build a record from a reading, routing the value through the classifier.
    ///
    /// The register address doubles as the tag name.
    pub fn from_reading(reading: &TagReading) -> Self {
        let value = if classify(&reading.value).is_numeric {
            match &reading.value {
                RawValue::Text(s) => s
                    .parse::<f64>()
                    .map(RecordValue::Numeric)
                    .unwrap_or_else(|_| RecordValue::Text(s.clone())),
                other => RecordValue::Numeric(other.as_f64().unwrap_or_default()),
            }
        } else {
            RecordValue::Text(reading.value.to_string())
        };

        Self {
            host: reading.host.clone(),
            tag_name: reading.register.clone(),
            register: reading.register.clone(),
            value,
            timestamp: reading.captured_at,
        }
    }

    /// Numeric value, if this is a numeric record.
    pub fn numeric_value(&self) -> Option<f64> {
        match &self.value {
            RecordValue::Numeric(v) => Some(*v),
            RecordValue::Text(_) => None,
        }
    }

    /// Text value, if this is a textual record.
    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            RecordValue::Numeric(_) => None,
            RecordValue::Text(s) => Some(s),
        }
    }
}

/// A sink that can durably record a [`DeliveryRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Remote (primary) store
    Remote,
    /// Local (secondary) store
    Local,
    /// Append-only fallback file
    FallbackFile,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Remote => "remote",
            Self::Local => "local",
            Self::FallbackFile => "fallback_file",
        };
        f.write_str(s)
    }
}

/// Where a record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// The sink that accepted the record
    pub sink: SinkKind,

    /// Whether an operator alert was attempted
    pub alerted: bool,
}

impl DeliveryOutcome {
    /// Delivered to a store without alerting.
    pub fn stored(sink: SinkKind) -> Self {
        Self {
            sink,
            alerted: false,
        }
    }

    /// Written to the fallback file with an alert attempt.
    pub fn fallback() -> Self {
        Self {
            sink: SinkKind::FallbackFile,
            alerted: true,
        }
    }
}
