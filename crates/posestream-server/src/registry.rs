//! Process-wide directory of client sessions.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use metrics::counter;
use parking_lot::RwLock;
use posestream_core::{ClientId, ErrorKind};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::metrics::BROADCAST_FAILURES_TOTAL;
use crate::session::ClientSession;

/// Registration failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A live session already holds this id.
    #[error("client id {0} is already registered")]
    DuplicateId(ClientId),
    /// The configured session limit is reached.
    #[error("registry is at capacity ({0} sessions)")]
    AtCapacity(usize),
}

impl RegistryError {
    /// Wire error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateId(_) => ErrorKind::DuplicateId,
            Self::AtCapacity(_) => ErrorKind::AtCapacity,
        }
    }
}

/// Why a broadcast did not reach a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// Outbound buffer full.
    Full,
    /// Outbound channel closed.
    Closed,
    /// Session dropped between snapshot and delivery.
    Gone,
}

/// One undelivered broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastFailure {
    /// Target session.
    pub client_id: ClientId,
    /// What went wrong.
    pub reason: FailureReason,
}

/// Outcome of [`ConnectionRegistry::broadcast`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the message was queued for.
    pub delivered: usize,
    /// Sessions it could not be queued for.
    pub failed: Vec<BroadcastFailure>,
}

/// Directory of registered sessions, keyed by client id.
///
/// Holds weak references only: the transport task owns each session. All
/// mutations take the write lock, so readers never observe a half-applied
/// change and a snapshot never contains a session registered after it was
/// taken.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<ClientId, Weak<ClientSession>>>,
    capacity: Option<usize>,
}

impl ConnectionRegistry {
    /// Unbounded registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that refuses registrations past `capacity` sessions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::with_capacity(capacity.min(1024))),
            capacity: Some(capacity),
        }
    }

    /// Configured session limit.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Add `session` under `id`.
    ///
    /// An entry whose session has already been dropped is replaced.
    pub fn register(&self, id: ClientId, session: &Arc<ClientSession>) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(&id) {
            if existing.strong_count() > 0 {
                return Err(RegistryError::DuplicateId(id));
            }
            debug!(client_id = %id, "replacing stale registry entry");
            let _ = sessions.remove(&id);
        }
        if let Some(cap) = self.capacity {
            if sessions.len() >= cap {
                return Err(RegistryError::AtCapacity(cap));
            }
        }
        let _ = sessions.insert(id, Arc::downgrade(session));
        Ok(())
    }

    /// Remove `id`. Idempotent.
    pub fn deregister(&self, id: &ClientId) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Remove `session`'s entry, leaving any other session registered under
    /// the same id untouched.
    pub(crate) fn release(&self, session: &ClientSession) -> bool {
        let mut sessions = self.sessions.write();
        let owned = sessions
            .get(session.id())
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), session));
        if owned {
            let _ = sessions.remove(session.id());
        }
        owned
    }

    /// Look up a live session.
    pub fn get(&self, id: &ClientId) -> Option<Arc<ClientSession>> {
        self.sessions.read().get(id).and_then(Weak::upgrade)
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Live sessions at this instant.
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Queue `message` on every registered session's outbound channel.
    ///
    /// Best effort: never waits for buffer space, never fails as a whole.
    pub fn broadcast(&self, message: &Arc<String>) -> BroadcastReport {
        let targets: Vec<(ClientId, Weak<ClientSession>)> = self
            .sessions
            .read()
            .iter()
            .map(|(id, weak)| (id.clone(), weak.clone()))
            .collect();

        let mut report = BroadcastReport::default();
        for (client_id, weak) in targets {
            let reason = match weak.upgrade() {
                None => FailureReason::Gone,
                Some(session) => match session.try_send(message.clone()) {
                    Ok(()) => {
                        report.delivered += 1;
                        continue;
                    }
                    Err(TrySendError::Full(_)) => FailureReason::Full,
                    Err(TrySendError::Closed(_)) => FailureReason::Closed,
                },
            };
            warn!(client_id = %client_id, ?reason, "broadcast not delivered");
            counter!(BROADCAST_FAILURES_TOTAL).increment(1);
            report.failed.push(BroadcastFailure { client_id, reason });
        }
        debug!(
            delivered = report.delivered,
            failed = report.failed.len(),
            "broadcast complete"
        );
        report
    }
}
