//! Session Store
//!
//! The registry through which callers address ratchet sessions.
//!
//! ## Responsibilities
//!
//! - Session Lifecycle: allocate identifiers, initialize, remove, expire
//! - Mutual Exclusion: at most one mutator per session at a time
//! - Isolation: operations on different sessions never contend on a lock
//!   held for the duration of a ratchet step
//!
//! ## Design
//!
//! - Sharded map: `DashMap<SessionId, Arc<Mutex<SessionEntry>>>`. A lookup
//!   clones the `Arc` and releases the shard lock before the session mutex is
//!   taken, so a long-held session lock never blocks its shard.
//! - Removal marks the entry under its lock, so a caller that looked the
//!   session up just before removal observes `SessionNotFound` instead of
//!   mutating an orphan.
//! - Expiry is pull-based: the host calls [`SessionStore::evict_expired`]
//!   every `sweep_interval`.

use std::{
    sync::{
        Arc, Mutex, TryLockError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    MessageKey, PublicKey,
    config::StoreConfig,
    env::Environment,
    error::RatchetError,
    session::{RatchetSession, SessionId, SessionState},
};

/// A stored session plus bookkeeping.
struct SessionEntry {
    session: RatchetSession,
    /// Refreshed by every successful operation.
    last_used: Instant,
    /// Set once the entry has left the map.
    removed: bool,
}

/// Concurrent registry of ratchet sessions.
///
/// Share it between request handlers with `Arc<SessionStore<E>>`; every
/// method takes `&self`.
pub struct SessionStore<E>
where
    E: Environment,
{
    sessions: DashMap<SessionId, Arc<Mutex<SessionEntry>>>,
    /// Live session count, reserved before insertion so the cap holds under
    /// concurrent creation.
    live: AtomicUsize,
    config: StoreConfig,
    env: E,
}

fn not_found(id: &SessionId) -> RatchetError {
    RatchetError::SessionNotFound { session_id: id.to_string() }
}

impl<E> SessionStore<E>
where
    E: Environment,
{
    /// Create an empty store.
    pub fn new(env: E, config: StoreConfig) -> Self {
        Self { sessions: DashMap::new(), live: AtomicUsize::new(0), config, env }
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Environment used for time and entropy.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Check if a session exists.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    fn reserve_slot(&self) -> Result<(), RatchetError> {
        match self.config.max_sessions {
            Some(limit) => self
                .live
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
                .map(|_| ())
                .map_err(|_| RatchetError::StoreFull { limit }),
            None => {
                self.live.fetch_add(1, Ordering::AcqRel);
                Ok(())
            },
        }
    }

    fn release_slot(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    /// Allocate, initialize, and store a new session.
    ///
    /// Returns the identifier and the session's first public key.
    ///
    /// # Errors
    ///
    /// - `RatchetError::StoreFull` if `max_sessions` is reached
    /// - `RatchetError::Entropy` if the identifier or key pair cannot be
    ///   generated
    pub fn create_session(&self) -> Result<(SessionId, PublicKey), RatchetError> {
        self.reserve_slot()?;
        self.build_and_insert().inspect_err(|_| self.release_slot())
    }

    fn build_and_insert(&self) -> Result<(SessionId, PublicKey), RatchetError> {
        let id = SessionId::generate(&self.env)?;
        let mut session = RatchetSession::new(id);
        session.init(&self.env)?;
        let public_key = session.export_public_key()?;

        let entry = SessionEntry { session, last_used: self.env.now(), removed: false };
        match self.sessions.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(entry)));
            },
            Entry::Occupied(_) => {
                return Err(RatchetError::Primitive {
                    reason: format!("session id collision: {id}"),
                });
            },
        }

        tracing::debug!(session_id = %id, sessions = self.sessions.len(), "session created");
        Ok((id, public_key))
    }

    /// Run `op` on a session while holding its lock.
    fn with_session<T>(
        &self,
        id: &SessionId,
        op: impl FnOnce(&mut RatchetSession) -> Result<T, RatchetError>,
    ) -> Result<T, RatchetError> {
        // Shard guard is dropped at the end of this statement.
        let entry =
            self.sessions.get(id).map(|e| Arc::clone(e.value())).ok_or_else(|| not_found(id))?;

        let mut guard = entry
            .lock()
            .map_err(|_| RatchetError::LockPoisoned { session_id: id.to_string() })?;
        if guard.removed {
            return Err(not_found(id));
        }

        let result = op(&mut guard.session)?;
        guard.last_used = self.env.now();
        Ok(result)
    }

    /// Current public key of a session.
    ///
    /// # Errors
    ///
    /// Returns `RatchetError::SessionNotFound` if the session does not exist.
    pub fn public_key(&self, id: &SessionId) -> Result<PublicKey, RatchetError> {
        self.with_session(id, |session| session.export_public_key())
    }

    /// Lifecycle state of a session.
    ///
    /// # Errors
    ///
    /// Returns `RatchetError::SessionNotFound` if the session does not exist.
    pub fn session_state(&self, id: &SessionId) -> Result<SessionState, RatchetError> {
        self.with_session(id, |session| Ok(session.state()))
    }

    /// Process the peer's public key (a DH ratchet step).
    ///
    /// Returns the session's new public key, read under the same lock as the
    /// ratchet step so it always belongs to this step.
    ///
    /// # Errors
    ///
    /// - `RatchetError::SessionNotFound` if the session does not exist
    /// - `RatchetError::InvalidKey` if the remote key is malformed; the
    ///   session is unchanged and the call may be retried with a valid key
    pub fn establish(
        &self,
        id: &SessionId,
        remote_public_key: &[u8],
    ) -> Result<PublicKey, RatchetError> {
        self.with_session(id, |session| {
            session.process_remote_key(remote_public_key, &self.env)?;
            session.export_public_key()
        })
    }

    /// Derive the next message key of a session.
    ///
    /// Not idempotent: each successful call consumes a chain position.
    ///
    /// # Errors
    ///
    /// - `RatchetError::SessionNotFound` if the session does not exist
    /// - `RatchetError::SessionNotEstablished` before a successful
    ///   [`establish`](Self::establish)
    pub fn derive_message_key(&self, id: &SessionId) -> Result<MessageKey, RatchetError> {
        self.with_session(id, RatchetSession::derive_message_key)
    }

    /// Destroy a session. Returns false if it did not exist.
    ///
    /// Waits for any in-flight operation on the session to finish.
    pub fn remove(&self, id: &SessionId) -> bool {
        let Some((_, entry)) = self.sessions.remove(id) else {
            return false;
        };

        match entry.lock() {
            Ok(mut guard) => guard.removed = true,
            Err(poisoned) => poisoned.into_inner().removed = true,
        }
        self.release_slot();

        tracing::debug!(session_id = %id, "session removed");
        true
    }

    /// Remove sessions idle for longer than `session_ttl`.
    ///
    /// Sessions whose lock is currently held are in use and are skipped.
    /// Returns the number of sessions evicted.
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.config.session_ttl else {
            return 0;
        };

        let now = self.env.now();
        let mut evicted = 0;

        self.sessions.retain(|id, entry| {
            let mut guard = match entry.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return true,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };

            if now.saturating_duration_since(guard.last_used) < ttl {
                return true;
            }

            guard.removed = true;
            evicted += 1;
            tracing::debug!(session_id = %id, "evicted idle session");
            false
        });

        if evicted > 0 {
            self.live.fetch_sub(evicted, Ordering::AcqRel);
        }
        evicted
    }
}

impl<E> std::fmt::Debug for SessionStore<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session_count", &self.sessions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
