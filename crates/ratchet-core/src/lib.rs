//! Ratchet Core
//!
//! The stateful half of the key ratchet: per-conversation sessions that run
//! DH ratchet steps and symmetric chain steps, and the store through which
//! callers address them.
//!
//! # Architecture
//!
//! ```text
//! SessionStore<E>
//!   ├─ DashMap<SessionId, Arc<Mutex<entry>>>   (per-session mutual exclusion)
//!   ├─ StoreConfig                             (TTL, sweep interval, capacity)
//!   └─ E: Environment                          (time, entropy, sleep)
//!         │
//!         ▼
//! RatchetSession  Uninitialized → AwaitingPeerKey → Established
//!   ├─ KeyPair     (rotated on every DH step)
//!   ├─ RootKey     (set on every DH step)
//!   └─ ChainKey    (advanced on every derived message key)
//! ```
//!
//! # Invariants
//!
//! - A chain key state derives at most one message key
//! - A failed operation leaves session state untouched
//! - Operations on different sessions never wait on each other

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod session;
pub mod store;

pub use config::StoreConfig;
pub use env::{EntropyError, Environment};
pub use error::RatchetError;
pub use ratchet_crypto::{MessageKey, PublicKey};
pub use session::{RatchetSession, SessionId, SessionState};
pub use store::SessionStore;
