//! Persisted log record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::LogLevel;

/// One key/value pair of a record's metadata.
///
/// Owned by exactly one record; entries are never shared between records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single persisted log call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the call happened (or the overridden historical time)
    pub created_at: DateTime<Utc>,

    pub level: LogLevel,

    /// Emitting subsystem (the handler's label)
    pub label: String,

    /// Session active when the call was accepted
    pub session: String,

    /// Rendered message
    pub text: String,

    /// Normalized metadata, unique keys
    pub metadata: Vec<MetadataEntry>,

    pub file: Option<String>,
    pub function: Option<String>,
    pub line: Option<u32>,
}

impl LogRecord {
    /// Look up a metadata value by key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// A record as read back from the store, with its position in append order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: u64,
    pub record: LogRecord,
}
