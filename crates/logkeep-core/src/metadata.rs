//! Structured metadata attached to log calls.
//!
//! Values come in a closed set of kinds. Only plain strings and
//! string-convertible values are persisted; dictionaries and arrays are
//! dropped without error so that metadata can never fail a log call.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::clock::Clock;
use crate::record::MetadataEntry;

/// Reserved key carrying a timestamp override. Never persisted as metadata.
pub const CREATED_AT_KEY: &str = "createdAt";

/// Metadata mapping for one call or one handler.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// Plain string, persisted unchanged
    String(String),
    /// Value with a canonical textual form
    Convertible(Convertible),
    /// Nested mapping (not persisted)
    Dictionary(Metadata),
    /// List of values (not persisted)
    Array(Vec<MetadataValue>),
}

/// A value that is persisted through its textual representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Convertible {
    Timestamp(DateTime<Utc>),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    /// Already-rendered text from `Display`/`Debug`
    Text(String),
}

impl fmt::Display for Convertible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convertible::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Convertible::Int(v) => write!(f, "{}", v),
            Convertible::UInt(v) => write!(f, "{}", v),
            Convertible::Float(v) => write!(f, "{}", v),
            Convertible::Bool(v) => write!(f, "{}", v),
            Convertible::Text(v) => f.write_str(v),
        }
    }
}

impl MetadataValue {
    /// Text to persist, or `None` for kinds that are dropped.
    pub fn to_persisted_string(&self) -> Option<String> {
        match self {
            MetadataValue::String(s) => Some(s.clone()),
            MetadataValue::Convertible(c) => Some(c.to_string()),
            MetadataValue::Dictionary(_) | MetadataValue::Array(_) => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetadataValue::Convertible(Convertible::Timestamp(value))
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Convertible(Convertible::Int(value))
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        MetadataValue::Convertible(Convertible::UInt(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Convertible(Convertible::Float(value))
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Convertible(Convertible::Bool(value))
    }
}

/// Flatten metadata into persisted entries.
///
/// One entry per retained key, in key order. The timestamp override key is
/// always excluded.
pub fn normalize(metadata: &Metadata) -> Vec<MetadataEntry> {
    normalize_iter(metadata.iter())
}

/// Flatten handler defaults combined with per-call metadata.
///
/// Per-call values win on key collision.
pub fn normalize_merged(defaults: &Metadata, call: Option<&Metadata>) -> Vec<MetadataEntry> {
    match call {
        None => normalize(defaults),
        Some(call) if defaults.is_empty() => normalize(call),
        Some(call) => {
            let mut merged: BTreeMap<&String, &MetadataValue> = defaults.iter().collect();
            merged.extend(call.iter());
            normalize_iter(merged.into_iter())
        }
    }
}

fn normalize_iter<'a>(
    entries: impl Iterator<Item = (&'a String, &'a MetadataValue)>,
) -> Vec<MetadataEntry> {
    entries
        .filter(|(key, _)| key.as_str() != CREATED_AT_KEY)
        .filter_map(|(key, value)| {
            value
                .to_persisted_string()
                .map(|value| MetadataEntry::new(key.clone(), value))
        })
        .collect()
}

/// Timestamp to persist for a call.
///
/// Uses the override only when it is a convertible timestamp; anything else
/// under the reserved key falls back to the clock.
pub fn resolve_timestamp(metadata: Option<&Metadata>, clock: &dyn Clock) -> DateTime<Utc> {
    match metadata.and_then(|m| m.get(CREATED_AT_KEY)) {
        Some(MetadataValue::Convertible(Convertible::Timestamp(ts))) => *ts,
        _ => clock.now(),
    }
}
