//! The persistent log handler.
//!
//! A [`LogHandler`] turns one log call into one [`LogRecord`] and hands it to
//! a [`LogWriter`]. Each subsystem usually owns its own handler with its own
//! label, default metadata and threshold; handlers share only the writer and
//! the session registry.
//!
//! ```ignore
//! use logkeep_core::{LogHandler, LogLevel, LogWriter, Metadata, SourceLocation, WriterConfig};
//!
//! let writer = LogWriter::open("./logs/app.redb", &WriterConfig::default())?;
//! let mut handler = LogHandler::new("network", writer);
//! handler.set_metadata_value("env", Some("prod".into()));
//!
//! let mut metadata = Metadata::new();
//! metadata.insert("url".into(), "https://example.com".into());
//! handler.log(LogLevel::Info, "request finished", Some(&metadata), SourceLocation::caller());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::clock::{system_clock, Clock};
use crate::metadata::{normalize_merged, resolve_timestamp, Metadata, MetadataValue};
use crate::record::LogRecord;
use crate::session::SessionRegistry;
use crate::types::{LogLevel, SessionId, SourceLocation};
use crate::writer::LogWriter;

/// Adapter from log calls to persisted records.
#[derive(Clone)]
pub struct LogHandler {
    label: String,
    metadata: Metadata,
    log_level: LogLevel,
    writer: LogWriter,
    clock: Arc<dyn Clock>,
    sessions: Arc<SessionRegistry>,
}

impl LogHandler {
    /// Create a handler for `label` writing through `writer`.
    ///
    /// Uses the wall clock, the process-wide session and an `Info` threshold.
    pub fn new(label: impl Into<String>, writer: LogWriter) -> Self {
        Self {
            label: label.into(),
            metadata: Metadata::new(),
            log_level: LogLevel::default(),
            writer,
            clock: system_clock(),
            sessions: SessionRegistry::global().clone(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Read sessions from `sessions` instead of the process-wide registry.
    pub fn with_sessions(mut self, sessions: Arc<SessionRegistry>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }

    /// Default metadata merged into every call.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Insert, replace or (with `None`) remove a default metadata value.
    pub fn set_metadata_value(&mut self, key: impl Into<String>, value: Option<MetadataValue>) {
        let key = key.into();
        match value {
            Some(value) => {
                self.metadata.insert(key, value);
            }
            None => {
                self.metadata.remove(&key);
            }
        }
    }

    pub fn writer(&self) -> &LogWriter {
        &self.writer
    }

    /// Start a new process-wide session and return its id.
    pub fn start_session() -> SessionId {
        SessionRegistry::global().rotate()
    }

    /// Persist one log call.
    ///
    /// Calls below the threshold are ignored. Never blocks on the store and
    /// never reports a failure.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl fmt::Display,
        metadata: Option<&Metadata>,
        source: SourceLocation,
    ) {
        if level < self.log_level {
            return;
        }

        let created_at = resolve_timestamp(metadata, self.clock.as_ref());
        let session = self.sessions.current();

        let record = LogRecord {
            created_at,
            level,
            label: self.label.clone(),
            session: session.to_string(),
            text: message.to_string(),
            metadata: normalize_merged(&self.metadata, metadata),
            file: source.file,
            function: source.function,
            line: source.line,
        };

        self.writer.enqueue(record);
    }
}

impl fmt::Debug for LogHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandler")
            .field("label", &self.label)
            .field("metadata", &self.metadata)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}
