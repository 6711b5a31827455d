//! Persistent record storage using redb.
//!
//! Records live in a single `messages` table keyed by a monotonically
//! increasing sequence number, so key order is append order. A record and
//! its metadata are serialized together and inserted in one write
//! transaction, which makes the metadata visible exactly when the record is.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::LogError;
use crate::record::{LogRecord, StoredRecord};

/// Table for log records (key: sequence number, value: postcard-encoded LogRecord)
const MESSAGES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("messages");

/// Append contract between the writer and a durable store.
///
/// Appends are issued from a single writer thread, in submission order.
pub trait MessageStore: Send + 'static {
    /// Persist one record together with its metadata, returning its sequence number.
    fn append(&self, record: &LogRecord) -> Result<u64, LogError>;
}

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct LogStore {
    db: Arc<Database>,
}

impl LogStore {
    /// Open (or create) a log database at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create the messages table
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MESSAGES_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Load every record in append order.
    pub fn list_records(&self) -> Result<Vec<StoredRecord>, LogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let record = LogRecord::from_bytes(value.value())
                .map_err(|e| LogError::Serialization(e.to_string()))?;
            records.push(StoredRecord {
                id: key.value(),
                record,
            });
        }
        Ok(records)
    }

    /// Number of persisted records.
    pub fn record_count(&self) -> Result<u64, LogError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES_TABLE)?;
        Ok(table.len()?)
    }
}

impl MessageStore for LogStore {
    fn append(&self, record: &LogRecord) -> Result<u64, LogError> {
        let data = record
            .to_bytes()
            .map_err(|e| LogError::Serialization(e.to_string()))?;

        let write_txn = self.db.begin_write()?;
        let id = {
            let mut table = write_txn.open_table(MESSAGES_TABLE)?;
            let next = match table.last()? {
                Some((key, _)) => key
                    .value()
                    .checked_add(1)
                    .ok_or_else(|| LogError::Store("message id space exhausted".to_string()))?,
                None => 0,
            };
            table.insert(next, data.as_slice())?;
            next
        };
        write_txn.commit()?;
        Ok(id)
    }
}

impl<T: MessageStore + Sync> MessageStore for Arc<T> {
    fn append(&self, record: &LogRecord) -> Result<u64, LogError> {
        (**self).append(record)
    }
}
