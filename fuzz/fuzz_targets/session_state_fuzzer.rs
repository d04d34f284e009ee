//! Fuzz target for the [`RatchetSession`] state machine
//!
//! Prevent key reuse and partial updates via arbitrary operation sequences
//!
//! # Strategy
//!
//! - Operation sequences: init, remote keys, derivations in any order
//! - Malformed keys: arbitrary byte strings, including low-order, twist and
//!   non-canonical points
//! - Entropy outages: toggle RNG failure between operations
//!
//! # Invariants
//!
//! - `Established` ONLY reachable via a successful remote key
//! - A rejected operation leaves state, public key and counters unchanged
//! - Every successful remote key rotates the local public key
//! - No message key is ever produced twice
//! - Session ID never changes
//! - NEVER panic on malformed input

#![no_main]

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use ratchet_core::{
    EntropyError, Environment, RatchetError, RatchetSession, SessionId, SessionState,
};
use ratchet_crypto::{KeyPair, PublicKey};

/// Seeded RNG with a failure switch.
#[derive(Clone)]
struct FuzzEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    failing: Arc<AtomicBool>,
}

impl Environment for FuzzEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(EntropyError { reason: "fuzz outage".to_string() });
        }
        let mut rng = self.rng.lock().map_err(|_| EntropyError {
            reason: "fuzz rng poisoned".to_string(),
        })?;
        rng.fill_bytes(buffer);
        Ok(())
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum SessionOp {
    Init,
    /// Well-formed peer key built from a fuzzed secret.
    PeerKey([u8; 32]),
    /// Arbitrary bytes presented as a peer key.
    RawKey(Vec<u8>),
    Derive,
    Export,
    SetEntropyFailing(bool),
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    ops: Vec<SessionOp>,
}

/// Everything observable about a session.
#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    state: SessionState,
    public_key: Option<[u8; 32]>,
    ratchet_steps: u64,
    messages_derived: u64,
}

fn snapshot(session: &RatchetSession) -> Snapshot {
    Snapshot {
        state: session.state(),
        public_key: session.export_public_key().ok().map(|k| *k.as_bytes()),
        ratchet_steps: session.ratchet_steps(),
        messages_derived: session.messages_derived(),
    }
}

fuzz_target!(|input: FuzzInput| {
    let env = FuzzEnv {
        rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(input.seed))),
        failing: Arc::new(AtomicBool::new(false)),
    };
    let Ok(id) = SessionId::generate(&env) else { return };
    let mut session = RatchetSession::new(id);
    let mut seen_keys = HashSet::new();

    for op in input.ops {
        let before = snapshot(&session);

        let ratchets = matches!(op, SessionOp::PeerKey(_) | SessionOp::RawKey(_));
        let result = match op {
            SessionOp::Init => {
                let result = session.init(&env);
                if before.state != SessionState::Uninitialized {
                    assert!(matches!(result, Err(RatchetError::AlreadyInitialized { .. })));
                }
                result
            },

            SessionOp::PeerKey(secret) => {
                let peer = KeyPair::from_secret_bytes(secret).public_key();
                session.process_remote_key(peer.as_bytes(), &env)
            },

            SessionOp::RawKey(bytes) => {
                let result = session.process_remote_key(&bytes, &env);
                let malformed = bytes.len() != 32 || bytes[31] & 0x80 != 0;
                if malformed && before.state != SessionState::Uninitialized {
                    assert!(matches!(result, Err(RatchetError::InvalidKey { .. })));
                }
                if result.is_ok() {
                    assert!(PublicKey::from_slice(&bytes).is_ok(), "unvalidated key accepted");
                }
                result
            },

            SessionOp::Derive => match session.derive_message_key() {
                Ok(key) => {
                    assert_eq!(before.state, SessionState::Established);
                    assert!(seen_keys.insert(*key.as_bytes()), "message key produced twice");
                    assert_eq!(session.messages_derived(), before.messages_derived + 1);
                    continue;
                },
                Err(e) => {
                    assert_ne!(before.state, SessionState::Established);
                    Err(e)
                },
            },

            SessionOp::Export => {
                let result = session.export_public_key().map(|_| ());
                assert_eq!(result.is_ok(), before.state != SessionState::Uninitialized);
                result
            },

            SessionOp::SetEntropyFailing(failing) => {
                env.failing.store(failing, Ordering::Relaxed);
                continue;
            },
        };

        let after = snapshot(&session);
        match result {
            Err(_) => assert_eq!(after, before, "failed operation mutated session"),
            Ok(()) if ratchets => {
                assert_eq!(after.state, SessionState::Established);
                assert_ne!(after.public_key, before.public_key, "DH step kept key pair");
                assert_eq!(after.ratchet_steps, before.ratchet_steps + 1);
                assert_eq!(after.messages_derived, 0);
            },
            Ok(()) if after.state == SessionState::AwaitingPeerKey => {
                assert_eq!(before.state, SessionState::Uninitialized);
            },
            Ok(()) => assert_eq!(after, before),
        }

        assert_eq!(session.session_id(), id);
    }
});
