//! Time source for record timestamps.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Supplies the timestamp for records that do not carry their own.
///
/// Any `Fn() -> DateTime<Utc>` is a clock, so tests can pin time with a
/// closure.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// The wall clock.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(Utc::now)
}
