//! Ratchet error types.

use ratchet_crypto::CryptoError;
use thiserror::Error;

use crate::env::EntropyError;

/// Errors from session and store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatchetError {
    /// No session with this identifier exists in the store.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// Identifier as supplied by the caller.
        session_id: String,
    },

    /// Remote public key is malformed or unusable.
    #[error("invalid remote key: {reason}")]
    InvalidKey {
        /// Why the key was rejected.
        reason: String,
    },

    /// A message key was requested before any key exchange completed.
    #[error("session not established: {session_id}")]
    SessionNotEstablished {
        /// Session that has no chain key yet.
        session_id: String,
    },

    /// The session has no key pair yet.
    #[error("session not initialized: {session_id}")]
    NotInitialized {
        /// Session that was never initialized.
        session_id: String,
    },

    /// `init` was called on a session that already has a key pair.
    #[error("session already initialized: {session_id}")]
    AlreadyInitialized {
        /// Session that was initialized twice.
        session_id: String,
    },

    /// The store has reached its configured session limit.
    #[error("session store full: {limit} sessions")]
    StoreFull {
        /// Configured maximum.
        limit: usize,
    },

    /// Entropy source failed while generating key material or an identifier.
    #[error(transparent)]
    Entropy(#[from] EntropyError),

    /// A cryptographic primitive failed for reasons other than bad input.
    #[error("cryptographic primitive failed: {reason}")]
    Primitive {
        /// Description of the failure.
        reason: String,
    },

    /// A thread panicked while holding the session lock.
    #[error("session lock poisoned: {session_id}")]
    LockPoisoned {
        /// Session whose lock was poisoned.
        session_id: String,
    },
}

impl From<CryptoError> for RatchetError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey { reason } => Self::InvalidKey { reason },
            other => Self::Primitive { reason: other.to_string() },
        }
    }
}

impl RatchetError {
    /// Returns true if the caller may retry the same operation after fixing
    /// its input.
    ///
    /// Only a rejected remote key qualifies. Deriving a message key is never
    /// idempotent, and the remaining errors need a different operation first
    /// (or indicate a broken environment).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidKey { .. } => true,

            Self::SessionNotFound { .. }
            | Self::SessionNotEstablished { .. }
            | Self::NotInitialized { .. }
            | Self::AlreadyInitialized { .. }
            | Self::StoreFull { .. }
            | Self::Entropy(_)
            | Self::Primitive { .. }
            | Self::LockPoisoned { .. } => false,
        }
    }
}
