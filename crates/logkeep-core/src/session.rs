//! Process-wide log session state.
//!
//! Every record is stamped with the session that was active when the record
//! was accepted. Reads happen on every log call while rotations are rare, so
//! the active id lives in an [`ArcSwap`]: readers do a single atomic load and
//! rotation is a compare-and-swap loop. Neither side takes a lock.

use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use crate::types::SessionId;

static GLOBAL: OnceLock<Arc<SessionRegistry>> = OnceLock::new();

/// Holds the active session identifier.
#[derive(Debug)]
pub struct SessionRegistry {
    current: ArcSwap<SessionId>,
}

impl SessionRegistry {
    /// Create a registry with a freshly generated session.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(SessionId::new()),
        }
    }

    /// The registry shared by every handler in the process.
    ///
    /// Created on first use, which starts the first session.
    pub fn global() -> &'static Arc<SessionRegistry> {
        GLOBAL.get_or_init(|| Arc::new(SessionRegistry::new()))
    }

    /// The active session identifier.
    pub fn current(&self) -> SessionId {
        **self.current.load()
    }

    /// Replace the active session with a new one and return it.
    ///
    /// The returned id always differs from the one it replaced.
    pub fn rotate(&self) -> SessionId {
        let mut next = SessionId::new();
        self.current.rcu(|prev| {
            while **prev == next {
                next = SessionId::new();
            }
            next
        });
        tracing::debug!(target: crate::INTERNAL_TARGET, session = %next, "started log session");
        next
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The active process-wide session.
pub fn current_session() -> SessionId {
    SessionRegistry::global().current()
}

/// Start a new process-wide session, returning its id.
pub fn start_session() -> SessionId {
    SessionRegistry::global().rotate()
}
