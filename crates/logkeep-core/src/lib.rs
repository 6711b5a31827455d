//! logkeep Core Library
//!
//! Durable, non-blocking sink for structured log events.
//!
//! ## Overview
//!
//! Every log call becomes one record in an embedded redb database, stamped
//! with the active session and carrying its metadata as flat string pairs.
//! Writes happen on a dedicated worker thread in submission order, so the
//! calling thread never waits for the disk, and a failing store only costs
//! the records it failed to write.
//!
//! ## Core Principles
//!
//! - **Never fails the caller**: logging returns no errors and never blocks
//! - **Ordered**: records reach the store in the order they were submitted
//! - **Session-aware**: records are grouped by a process-wide session id that
//!   the application can rotate at any time
//!
//! ## Quick Start
//!
//! ```ignore
//! use logkeep_core::LoggingBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let writer = LoggingBuilder::new("./logs/app.redb", "app")
//!         .with_filter("app=debug")
//!         .init()?;
//!
//!     tracing::info!(user = "alice", "signed in");
//!
//!     logkeep_core::start_session();
//!     tracing::info!("new session");
//!
//!     writer.flush();
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod error;
pub mod handler;
pub mod layer;
pub mod metadata;
pub mod record;
pub mod session;
pub mod storage;
pub mod types;
pub mod writer;

/// Target of logkeep's own diagnostics. Events with this target are never persisted.
pub const INTERNAL_TARGET: &str = "logkeep::internal";

// Re-exports
pub use clock::{system_clock, Clock};
pub use error::{LogError, LogResult};
pub use handler::LogHandler;
pub use layer::{LoggingBuilder, PersistentLayer};
pub use metadata::{Convertible, Metadata, MetadataValue, CREATED_AT_KEY};
pub use record::{LogRecord, MetadataEntry, StoredRecord};
pub use session::{current_session, start_session, SessionRegistry};
pub use storage::{LogStore, MessageStore};
pub use types::*;
pub use writer::{LogWriter, WriterConfig, WriterStats};
