//! Connection registry: who is online, with admission control.
//!
//! One entry per user; the newest session for a user wins. The map lock is
//! held only for the map operation itself. Closing a displaced or removed
//! session happens after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use chathub_core::UserId;
use metrics::gauge;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::metrics::WS_CONNECTIONS_ACTIVE;
use crate::websocket::connection::{CloseReason, SessionHandle, SessionState};

/// Registry failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The registry already holds `capacity` sessions.
    #[error("capacity exceeded ({capacity} sessions)")]
    CapacityExceeded {
        /// Configured limit.
        capacity: usize,
    },
}

/// Tracks the live session of every connected user.
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<UserId, Arc<SessionHandle>>>,
    capacity: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry admitting at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Admit `handle`.
    ///
    /// Refused when the registry is at capacity, even if the user already has
    /// a session. On success any previous session for the same user is
    /// returned after being closed as replaced.
    pub fn register(
        &self,
        handle: Arc<SessionHandle>,
    ) -> Result<Option<Arc<SessionHandle>>, HubError> {
        let user_id = handle.user_id();
        let (displaced, count) = {
            let mut sessions = self.sessions.lock();
            if sessions.len() >= self.capacity {
                return Err(HubError::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
            let displaced = sessions.insert(user_id, Arc::clone(&handle));
            (displaced, sessions.len())
        };

        handle.advance(SessionState::Registered);
        record_active(count);
        if let Some(ref old) = displaced {
            info!(user_id = %user_id, old_conn = %old.conn_id(), new_conn = %handle.conn_id(), "session replaced");
            let _ = old.close(CloseReason::Replaced);
        } else {
            debug!(user_id = %user_id, conn_id = %handle.conn_id(), count, "session registered");
        }
        Ok(displaced)
    }

    /// Remove the session for `user_id` and close it.
    ///
    /// Idempotent: returns `false` when nothing was registered.
    pub fn unregister(&self, user_id: UserId) -> bool {
        let (removed, count) = {
            let mut sessions = self.sessions.lock();
            let removed = sessions.remove(&user_id);
            (removed, sessions.len())
        };
        match removed {
            Some(handle) => {
                record_active(count);
                let _ = handle.close(CloseReason::Unregistered);
                debug!(user_id = %user_id, conn_id = %handle.conn_id(), "session unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove `handle`'s entry only if it is still the registered session
    /// for its user. Used by session teardown so a replaced session never
    /// evicts its successor.
    pub fn release(&self, handle: &SessionHandle) -> bool {
        let (released, count) = {
            let mut sessions = self.sessions.lock();
            let current = sessions
                .get(&handle.user_id())
                .is_some_and(|h| h.conn_id() == handle.conn_id());
            if current {
                let _ = sessions.remove(&handle.user_id());
            }
            (current, sessions.len())
        };
        if released {
            record_active(count);
        }
        released
    }

    /// The live session for `user_id`, if any.
    ///
    /// Returns a shared handle; the registry lock is not held by the caller.
    pub fn lookup(&self, user_id: UserId) -> Option<Arc<SessionHandle>> {
        self.sessions.lock().get(&user_id).cloned()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Configured limit.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a new registration would be refused right now.
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Close every registered session with `reason`, leaving entries for the
    /// sessions' own teardown to release.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let handles: Vec<_> = self.sessions.lock().values().cloned().collect();
        for handle in &handles {
            let _ = handle.close(reason);
        }
        handles.len()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(count: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
}
