//! Elliptic-curve key agreement.
//!
//! Ephemeral X25519 key pairs and the Diffie-Hellman computation used by every
//! DH ratchet step. The agreement property holds for any two pairs:
//! `a.agree(&b.public_key()) == b.agree(&a.public_key())`.
//!
//! # Invariants
//!
//! - The private scalar never leaves a [`KeyPair`] and is zeroized on drop
//! - A [`PublicKey`] only exists for a canonical encoding of a point on
//!   Curve25519: exactly [`PUBLIC_KEY_SIZE`] bytes, high bit clear,
//!   u-coordinate below the field prime, and not a point on the twist
//! - Non-contributory agreements (low-order peer points) are rejected, so a
//!   malicious peer cannot force an all-zero shared secret

use curve25519_dalek::MontgomeryPoint;
use x25519_dalek::{PublicKey as DalekPublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Size of an encoded public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the secret seed a key pair is built from.
pub const SECRET_KEY_SIZE: usize = 32;

/// Little-endian encoding of the field prime 2^255 - 19.
const FIELD_PRIME: [u8; PUBLIC_KEY_SIZE] = {
    let mut p = [0xff; PUBLIC_KEY_SIZE];
    p[0] = 0xed;
    p[31] = 0x7f;
    p
};

fn invalid(reason: impl Into<String>) -> CryptoError {
    CryptoError::InvalidKey { reason: reason.into() }
}

/// Compare two little-endian field encodings.
fn is_below_prime(u: &[u8; PUBLIC_KEY_SIZE]) -> bool {
    for (byte, prime) in u.iter().rev().zip(FIELD_PRIME.iter().rev()) {
        if byte != prime {
            return byte < prime;
        }
    }
    false
}

/// X25519 public key in its 32-byte transport encoding.
///
/// Only constructible from a validated encoding, so every instance names a
/// point on the curve.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Parse a public key received from a peer.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if `bytes` is not exactly
    /// [`PUBLIC_KEY_SIZE`] bytes, is not a canonical u-coordinate, or is not
    /// on Curve25519.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let u: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            invalid(format!("expected {PUBLIC_KEY_SIZE} bytes, got {}", bytes.len()))
        })?;

        if u[31] & 0x80 != 0 {
            return Err(invalid("high bit set in u-coordinate"));
        }
        if !is_below_prime(&u) {
            return Err(invalid("u-coordinate is not reduced"));
        }
        // The birational map to Edwards form fails exactly for twist points.
        if MontgomeryPoint(u).to_edwards(0).is_none() {
            return Err(invalid("point is not on curve25519"));
        }

        Ok(Self(u))
    }

    /// Raw bytes for transport.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Owned copy of the transport encoding.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, ..] = self.0;
        write!(f, "PublicKey({a:02x}{b:02x}{c:02x}{d:02x}..)")
    }
}

/// Raw output of a Diffie-Hellman computation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Borrow the secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Ephemeral X25519 key pair.
///
/// Dropping the pair zeroizes the private scalar, which is how a ratchet
/// step discards the superseded key.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from 32 uniformly random bytes.
    ///
    /// The caller's copy of `seed` is consumed; clamping is applied by the
    /// curve implementation.
    pub fn from_secret_bytes(mut seed: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(seed);
        seed.zeroize();
        let public = PublicKey(DalekPublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    /// The public half, encoded for transport.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Compute the shared secret with a peer's public key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the peer key is a low-order point
    /// (the agreement would not depend on our private key).
    pub fn agree(&self, remote: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let shared = self.secret.diffie_hellman(&DalekPublicKey::from(remote.0));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey {
                reason: "non-contributory key agreement (low-order point)".to_string(),
            });
        }
        Ok(SharedSecret(shared.to_bytes()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}
