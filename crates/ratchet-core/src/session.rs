//! Ratchet session state machine.
//!
//! A session owns one local DH key pair and, once a peer key has been
//! processed, one root key and one chain key.
//!
//! ```text
//!                init()                process_remote_key()
//! Uninitialized ───────► AwaitingPeerKey ──────────────────► Established ◄─┐
//!                                                               │          │
//!                                                               └──────────┘
//!                                                  process_remote_key() / derive_message_key()
//! ```
//!
//! # Invariants
//!
//! - The chain key exists only in `Established`
//! - Each chain key derives exactly one message key before it is replaced
//! - Every DH step replaces the local key pair; the old private key is
//!   zeroized when it is dropped
//! - A failed call leaves the key pair, root key, and chain key unchanged

use std::{fmt, str::FromStr};

use ratchet_crypto::{
    ChainKey, KeyPair, MessageKey, PublicKey, RootKey, SECRET_KEY_SIZE, advance_chain_key,
    derive_message_key,
};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    env::{EntropyError, Environment},
    error::RatchetError,
};

/// Opaque external handle of a session (random UUID).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocate a fresh random identifier.
    pub fn generate<E: Environment>(env: &E) -> Result<Self, EntropyError> {
        let bytes = env.random_array16()?;
        Ok(Self(uuid::Builder::from_random_bytes(bytes).into_uuid()))
    }

    /// The identifier as a UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Observable lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no key pair yet.
    Uninitialized,
    /// Local key pair generated, waiting for the peer's public key.
    AwaitingPeerKey,
    /// At least one DH step completed; message keys can be derived.
    Established,
}

/// Secret material per state. Dropping a variant zeroizes its keys.
enum Keys {
    Uninitialized,
    AwaitingPeerKey { key_pair: KeyPair },
    Established { key_pair: KeyPair, root_key: RootKey, chain_key: ChainKey },
}

/// One side of a two-party ratchet.
///
/// Methods take `&mut self`; callers sharing a session across threads must
/// serialize access (the [`SessionStore`](crate::SessionStore) does this
/// with a per-session mutex).
pub struct RatchetSession {
    id: SessionId,
    keys: Keys,
    /// Completed DH ratchet steps.
    ratchet_steps: u64,
    /// Message keys derived since the last DH step.
    messages_derived: u64,
}

fn generate_key_pair<E: Environment>(env: &E) -> Result<KeyPair, RatchetError> {
    let mut seed = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
    env.random_bytes(&mut *seed)?;
    Ok(KeyPair::from_secret_bytes(*seed))
}

impl RatchetSession {
    /// Create an uninitialized session.
    pub fn new(id: SessionId) -> Self {
        Self { id, keys: Keys::Uninitialized, ratchet_steps: 0, messages_derived: 0 }
    }

    /// Session identifier.
    pub fn session_id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match self.keys {
            Keys::Uninitialized => SessionState::Uninitialized,
            Keys::AwaitingPeerKey { .. } => SessionState::AwaitingPeerKey,
            Keys::Established { .. } => SessionState::Established,
        }
    }

    /// Number of completed DH ratchet steps.
    pub fn ratchet_steps(&self) -> u64 {
        self.ratchet_steps
    }

    /// Number of message keys derived in the current DH epoch.
    pub fn messages_derived(&self) -> u64 {
        self.messages_derived
    }

    /// Generate the initial local key pair.
    ///
    /// # Errors
    ///
    /// - `RatchetError::AlreadyInitialized` outside `Uninitialized`
    /// - `RatchetError::Entropy` if key generation cannot get randomness
    pub fn init<E: Environment>(&mut self, env: &E) -> Result<(), RatchetError> {
        if !matches!(self.keys, Keys::Uninitialized) {
            return Err(RatchetError::AlreadyInitialized { session_id: self.id.to_string() });
        }

        let key_pair = generate_key_pair(env)?;
        self.keys = Keys::AwaitingPeerKey { key_pair };

        tracing::debug!(session_id = %self.id, "session initialized");
        Ok(())
    }

    /// Current local public key, for transport to the peer.
    ///
    /// # Errors
    ///
    /// Returns `RatchetError::NotInitialized` in `Uninitialized`.
    pub fn export_public_key(&self) -> Result<PublicKey, RatchetError> {
        match &self.keys {
            Keys::Uninitialized => {
                Err(RatchetError::NotInitialized { session_id: self.id.to_string() })
            },
            Keys::AwaitingPeerKey { key_pair } | Keys::Established { key_pair, .. } => {
                Ok(key_pair.public_key())
            },
        }
    }

    /// Perform a DH ratchet step with the peer's public key.
    ///
    /// Computes the shared secret with the current private key, installs it
    /// as the root key, derives the first chain key, and replaces the local
    /// key pair. Every call ratchets, including a repeated submission of the
    /// same peer key.
    ///
    /// All fallible work happens before any state is replaced.
    ///
    /// # Errors
    ///
    /// - `RatchetError::NotInitialized` in `Uninitialized`
    /// - `RatchetError::InvalidKey` if `remote_public_key` is malformed
    /// - `RatchetError::Entropy` if the replacement key pair cannot be made
    pub fn process_remote_key<E: Environment>(
        &mut self,
        remote_public_key: &[u8],
        env: &E,
    ) -> Result<(), RatchetError> {
        let key_pair = match &self.keys {
            Keys::Uninitialized => {
                return Err(RatchetError::NotInitialized { session_id: self.id.to_string() });
            },
            Keys::AwaitingPeerKey { key_pair } | Keys::Established { key_pair, .. } => key_pair,
        };

        let remote = PublicKey::from_slice(remote_public_key).inspect_err(|e| {
            tracing::warn!(session_id = %self.id, "rejected remote key: {}", e);
        })?;
        let shared = key_pair.agree(&remote).inspect_err(|e| {
            tracing::warn!(session_id = %self.id, "rejected remote key: {}", e);
        })?;

        let root_key = RootKey::from(shared);
        let chain_key = root_key.initial_chain_key();
        let next_key_pair = generate_key_pair(env)?;

        self.keys = Keys::Established { key_pair: next_key_pair, root_key, chain_key };
        self.ratchet_steps = self.ratchet_steps.saturating_add(1);
        self.messages_derived = 0;

        tracing::debug!(session_id = %self.id, step = self.ratchet_steps, "DH ratchet step");
        Ok(())
    }

    /// Derive the next one-time message key and advance the chain.
    ///
    /// There is no way to derive the same key twice: the chain key that
    /// produced it is replaced before this returns.
    ///
    /// # Errors
    ///
    /// Returns `RatchetError::SessionNotEstablished` unless `Established`.
    pub fn derive_message_key(&mut self) -> Result<MessageKey, RatchetError> {
        let Keys::Established { chain_key, .. } = &mut self.keys else {
            return Err(RatchetError::SessionNotEstablished { session_id: self.id.to_string() });
        };

        let message_key = derive_message_key(chain_key);
        *chain_key = advance_chain_key(chain_key);
        self.messages_derived = self.messages_derived.saturating_add(1);

        tracing::trace!(
            session_id = %self.id,
            index = self.messages_derived,
            "message key derived"
        );
        Ok(message_key)
    }
}

impl fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatchetSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("ratchet_steps", &self.ratchet_steps)
            .field("messages_derived", &self.messages_derived)
            .finish_non_exhaustive()
    }
}
