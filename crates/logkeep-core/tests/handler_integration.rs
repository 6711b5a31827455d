//! End-to-end tests for the persistent handler
//!
//! These tests drive `LogHandler` against a real redb store and verify what
//! ends up on disk: record contents, session stamping, ordering, and
//! isolation from store failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use logkeep_core::{
    LogError, LogHandler, LogLevel, LogRecord, LogStore, LogWriter, MessageStore,
    Metadata, MetadataValue, SessionRegistry, SourceLocation, WriterConfig, CREATED_AT_KEY,
};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    _temp: TempDir,
    store: LogStore,
    writer: LogWriter,
    sessions: Arc<SessionRegistry>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = LogStore::open(temp.path().join("logs.redb")).unwrap();
        let writer = LogWriter::spawn(store.clone(), &WriterConfig::default()).unwrap();
        Self {
            _temp: temp,
            store,
            writer,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    fn handler(&self, label: &str) -> LogHandler {
        LogHandler::new(label, self.writer.clone()).with_sessions(self.sessions.clone())
    }

    fn records(&self) -> Vec<LogRecord> {
        self.writer.flush();
        self.store
            .list_records()
            .unwrap()
            .into_iter()
            .map(|stored| stored.record)
            .collect()
    }
}

/// Delegates to a redb store but rejects every record whose text is "fail".
struct FlakyStore {
    inner: LogStore,
    rejected: AtomicU64,
}

impl MessageStore for FlakyStore {
    fn append(&self, record: &LogRecord) -> Result<u64, LogError> {
        if record.text == "fail" {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(LogError::Store("constraint violation".to_string()));
        }
        self.inner.append(record)
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_plain_message() {
    let fixture = Fixture::new();
    let handler = fixture.handler("app");

    handler.log(LogLevel::Info, "hello", Some(&Metadata::new()), SourceLocation::default());

    let records = fixture.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "hello");
    assert!(records[0].metadata.is_empty());
    assert_eq!(records[0].session, fixture.sessions.current().to_string());
}

#[test]
fn test_timestamp_override_is_stripped() {
    let fixture = Fixture::new();
    let handler = fixture.handler("import");
    let original = Utc.with_ymd_and_hms(2016, 7, 4, 18, 0, 0).unwrap();

    let mut metadata = Metadata::new();
    metadata.insert(CREATED_AT_KEY.into(), original.into());
    handler.log(LogLevel::Info, "x", Some(&metadata), SourceLocation::default());

    let records = fixture.records();
    assert_eq!(records[0].created_at, original);
    assert!(records[0].metadata.is_empty());
}

#[test]
fn test_unsupported_value_is_dropped() {
    let fixture = Fixture::new();
    let handler = fixture.handler("app");

    let mut metadata = Metadata::new();
    metadata.insert("a".into(), "1".into());
    metadata.insert("b".into(), MetadataValue::Array(vec!["nested".into()]));
    handler.log(LogLevel::Info, "x", Some(&metadata), SourceLocation::default());

    let records = fixture.records();
    assert_eq!(records[0].metadata.len(), 1);
    assert_eq!(records[0].metadata_value("a"), Some("1"));
}

#[test]
fn test_session_changes_between_calls() {
    let fixture = Fixture::new();
    let handler = fixture.handler("app");

    handler.log(LogLevel::Info, "before", None, SourceLocation::default());
    let before = fixture.sessions.current();
    let started = fixture.sessions.rotate();
    assert_ne!(before, started);
    handler.log(LogLevel::Info, "after", None, SourceLocation::default());
    handler.log(LogLevel::Info, "after again", None, SourceLocation::default());

    let records = fixture.records();
    assert_ne!(records[0].session, records[1].session);
    assert_eq!(records[1].session, started.to_string());
    assert_eq!(records[2].session, started.to_string());
}

#[test]
fn test_session_is_taken_at_accept_time() {
    // A record queued before a rotation keeps the old session even though it
    // is written afterwards.
    let fixture = Fixture::new();
    let handler = fixture.handler("app");

    let before = fixture.sessions.current();
    for i in 0..100 {
        handler.log(LogLevel::Info, i, None, SourceLocation::default());
    }
    fixture.sessions.rotate();

    let records = fixture.records();
    assert_eq!(records.len(), 100);
    assert!(records.iter().all(|r| r.session == before.to_string()));
}

#[test]
fn test_process_wide_session_rotation() {
    // The only test in this binary that touches the global registry.
    let temp = TempDir::new().unwrap();
    let store = LogStore::open(temp.path().join("logs.redb")).unwrap();
    let writer = LogWriter::spawn(store.clone(), &WriterConfig::default()).unwrap();
    let handler = LogHandler::new("global", writer.clone());

    let previous = logkeep_core::current_session();
    let started = LogHandler::start_session();
    assert_ne!(previous, started);
    assert_eq!(logkeep_core::current_session(), started);

    handler.log(LogLevel::Info, "tagged", None, SourceLocation::default());
    writer.flush();

    let records = store.list_records().unwrap();
    assert_eq!(records[0].record.session, started.to_string());
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_fifo_order_single_handler() {
    let fixture = Fixture::new();
    let handler = fixture.handler("app");

    for i in 0..500 {
        handler.log(LogLevel::Info, format!("msg-{}", i), None, SourceLocation::default());
    }

    let texts: Vec<_> = fixture.records().into_iter().map(|r| r.text).collect();
    let expected: Vec<_> = (0..500).map(|i| format!("msg-{}", i)).collect();
    assert_eq!(texts, expected);
}

#[test]
fn test_per_thread_order_preserved_across_handlers() {
    let fixture = Fixture::new();

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let handler = fixture.handler(&format!("worker-{}", t));
            thread::spawn(move || {
                for i in 0..200 {
                    let mut metadata = Metadata::new();
                    metadata.insert("seq".into(), (i as u64).into());
                    handler.log(LogLevel::Info, i, Some(&metadata), SourceLocation::default());
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let records = fixture.records();
    assert_eq!(records.len(), 800);

    for t in 0..4 {
        let label = format!("worker-{}", t);
        let seqs: Vec<u64> = records
            .iter()
            .filter(|r| r.label == label)
            .map(|r| r.metadata_value("seq").unwrap().parse().unwrap())
            .collect();
        let expected: Vec<u64> = (0..200).collect();
        assert_eq!(seqs, expected, "records from {} were reordered", label);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logging_from_async_tasks() {
    let fixture = Fixture::new();

    let mut tasks = Vec::new();
    for t in 0..8 {
        let handler = fixture.handler("async");
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                handler.log(
                    LogLevel::Notice,
                    format!("task {} step {}", t, i),
                    None,
                    SourceLocation::caller(),
                );
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let records = fixture.records();
    assert_eq!(records.len(), 400);
    assert!(records.iter().all(|r| r.level == LogLevel::Notice));
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_failure_does_not_affect_neighbours() {
    let temp = TempDir::new().unwrap();
    let inner = LogStore::open(temp.path().join("logs.redb")).unwrap();
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        rejected: AtomicU64::new(0),
    });
    let writer = LogWriter::spawn(store.clone(), &WriterConfig::default()).unwrap();
    let handler = LogHandler::new("flaky", writer.clone());

    handler.log(LogLevel::Info, "before", None, SourceLocation::default());
    handler.log(LogLevel::Info, "fail", None, SourceLocation::default());
    handler.log(LogLevel::Info, "after", None, SourceLocation::default());
    writer.flush();

    let texts: Vec<_> = inner
        .list_records()
        .unwrap()
        .into_iter()
        .map(|r| r.record.text)
        .collect();
    assert_eq!(texts, vec!["before", "after"]);
    assert_eq!(store.rejected.load(Ordering::Relaxed), 1);
    assert_eq!(writer.stats().failed(), 1);
    assert_eq!(writer.stats().written(), 2);
}

#[test]
fn test_handlers_keep_writer_alive() {
    // Dropping the original writer handle does not stop the worker while
    // handlers still hold clones of it.
    let fixture = Fixture::new();
    let handler = fixture.handler("app");
    let Fixture {
        _temp,
        store,
        writer,
        ..
    } = fixture;
    drop(writer);

    handler.log(LogLevel::Info, "still fine", None, SourceLocation::default());
    handler.writer().flush();

    assert_eq!(store.record_count().unwrap(), 1);
    assert_eq!(handler.writer().stats().dropped(), 0);
}
