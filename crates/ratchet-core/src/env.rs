//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples ratchet logic from system resources
//! (time, randomness, sleeping). This enables:
//!
//! - Deterministic tests: a seeded RNG and a manual clock make key material
//!   and session expiry reproducible.
//!
//! - Production runtime: the server's `SystemEnv` uses the OS entropy pool
//!   and the Tokio timer without any change to the protocol logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Honest entropy: `random_bytes()` reports failure instead of returning
//!   predictable bytes
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

use thiserror::Error;

/// The entropy source could not produce random bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entropy source failed: {reason}")]
pub struct EntropyError {
    /// Description from the underlying source.
    pub reason: String,
}

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. RNG quality: `random_bytes()` uses cryptographically secure entropy in
///    production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code (the expiry sweeper) sleeps; ratchet logic never
    /// does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST draw from the OS entropy pool and
    /// MUST return an error rather than fill the buffer with a fallback.
    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError>;

    /// Generates a random 16-byte value.
    ///
    /// Used for session identifiers.
    fn random_array16(&self) -> Result<[u8; 16], EntropyError> {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes)?;
        Ok(bytes)
    }
}
