//! Custom tracing Layer that persists events through a [`LogHandler`].
//!
//! This layer integrates with the `tracing` crate to capture log events and
//! hand them to the durable writer. Event fields become per-call metadata;
//! the event target and span path are recorded alongside them.

use std::fmt::Write as FmtWrite;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::LogError;
use crate::handler::LogHandler;
use crate::metadata::{Convertible, Metadata, MetadataValue, CREATED_AT_KEY};
use crate::types::{LogLevel, SourceLocation};
use crate::writer::{LogWriter, WriterConfig};
use crate::INTERNAL_TARGET;

/// Metadata key holding the event target
pub const TARGET_KEY: &str = "target";

/// Metadata key holding the span path (root first)
pub const SPAN_KEY: &str = "span";

/// A tracing Layer that persists events.
///
/// Records carry the handler's label; the handler's threshold and default
/// metadata apply to every event.
pub struct PersistentLayer {
    handler: LogHandler,
}

impl PersistentLayer {
    pub fn new(handler: LogHandler) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &LogHandler {
        &self.handler
    }

    pub fn writer(&self) -> &LogWriter {
        self.handler.writer()
    }
}

impl<S> Layer<S> for PersistentLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        // Our own diagnostics would feed back into the store.
        if metadata.target() == INTERNAL_TARGET {
            return;
        }

        let level = LogLevel::from(*metadata.level());
        if level < self.handler.log_level() {
            return;
        }

        let mut visitor = MetadataVisitor::new();
        event.record(&mut visitor);

        let message = visitor.message.unwrap_or_default();
        let mut fields = visitor.fields;

        fields
            .entry(TARGET_KEY.to_string())
            .or_insert_with(|| MetadataValue::String(metadata.target().to_string()));

        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !spans.is_empty() {
                fields
                    .entry(SPAN_KEY.to_string())
                    .or_insert_with(|| MetadataValue::String(spans.join(" > ")));
            }
        }

        let source = SourceLocation {
            file: metadata.file().map(str::to_string),
            function: metadata.module_path().map(str::to_string),
            line: metadata.line(),
        };

        self.handler.log(level, message, Some(&fields), source);
    }
}

/// Visitor that turns tracing fields into metadata values.
struct MetadataVisitor {
    message: Option<String>,
    fields: Metadata,
}

impl MetadataVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: Metadata::new(),
        }
    }

    fn insert_text(&mut self, field: &Field, text: String, plain: bool) {
        let name = field.name();
        if name == "message" {
            self.message = Some(text);
            return;
        }

        let value = if name == CREATED_AT_KEY {
            match parse_timestamp(&text) {
                Some(ts) => MetadataValue::Convertible(Convertible::Timestamp(ts)),
                None => MetadataValue::String(text),
            }
        } else if plain {
            MetadataValue::String(text)
        } else {
            MetadataValue::Convertible(Convertible::Text(text))
        };
        self.fields.insert(name.to_string(), value);
    }

    fn insert(&mut self, field: &Field, value: Convertible) {
        self.fields
            .insert(field.name().to_string(), MetadataValue::Convertible(value));
    }
}

impl Visit for MetadataVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(&mut buf, "{:?}", value);
        self.insert_text(field, buf, false);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert_text(field, value.to_string(), true);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Convertible::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Convertible::UInt(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Convertible::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Convertible::Float(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Convertible::Text(value.to_string()));
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| text.parse::<DateTime<Utc>>().ok())
}

/// Builder for creating a tracing subscriber with persistent logging.
pub struct LoggingBuilder {
    db_path: PathBuf,
    label: String,
    console_output: bool,
    env_filter: Option<String>,
    min_level: LogLevel,
    writer_config: WriterConfig,
}

impl LoggingBuilder {
    /// Create a new logging builder.
    pub fn new(db_path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            label: label.into(),
            console_output: true,
            env_filter: None,
            min_level: LogLevel::default(),
            writer_config: WriterConfig::default(),
        }
    }

    /// Disable console output (only persist).
    pub fn no_console(mut self) -> Self {
        self.console_output = false;
        self
    }

    /// Set the environment filter (e.g., "myapp=debug,hyper=warn").
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Lowest level that is persisted.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_writer_config(mut self, config: WriterConfig) -> Self {
        self.writer_config = config;
        self
    }

    /// Build and return the persistent layer (for manual composition).
    pub fn build_layer(&self) -> Result<PersistentLayer, LogError> {
        let writer = LogWriter::open(&self.db_path, &self.writer_config)?;
        let handler = LogHandler::new(self.label.clone(), writer).with_log_level(self.min_level);
        Ok(PersistentLayer::new(handler))
    }

    /// Install a global subscriber and return the writer so the host can
    /// flush it before exiting.
    pub fn init(self) -> Result<LogWriter, LogError> {
        let layer = self.build_layer()?;
        let writer = layer.writer().clone();

        let filter = match &self.env_filter {
            Some(filter) => EnvFilter::new(filter),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::default().add_directive(level_filter(self.min_level).into())
            }),
        };
        let console = self.console_output.then(tracing_subscriber::fmt::layer);

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .with(console)
            .try_init()
            .map_err(|e| LogError::Subscriber(e.to_string()))?;

        Ok(writer)
    }
}

/// Coarsest tracing filter that still lets `level` through.
fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info | LogLevel::Notice => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
    }
}
