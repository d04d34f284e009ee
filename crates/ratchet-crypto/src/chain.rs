//! Symmetric key chain derivation.
//!
//! ```text
//! shared secret ──► RootKey ──SHA-256──► ChainKey[0]
//!                                          │
//!                    SHA-256(ck ‖ 0x01) ◄──┼──► SHA-256(ck ‖ 0x02)
//!                          │               │            │
//!                     MessageKey[0]        │       ChainKey[1] ──► ...
//! ```
//!
//! Each derivation hashes a differently shaped input, so a message key never
//! reveals the chain key it came from and vice versa.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::agreement::SharedSecret;

/// Size of root, chain, and message keys.
pub const KEY_SIZE: usize = 32;

/// Domain separation tag for message key derivation.
pub const MESSAGE_KEY_TAG: u8 = 0x01;

/// Domain separation tag for chain key advancement.
pub const CHAIN_KEY_TAG: u8 = 0x02;

/// Root secret produced by the most recent DH ratchet step.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; KEY_SIZE]);

impl RootKey {
    /// Derive the first chain key of this DH epoch.
    pub fn initial_chain_key(&self) -> ChainKey {
        ChainKey(Sha256::digest(self.0).into())
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl From<SharedSecret> for RootKey {
    fn from(secret: SharedSecret) -> Self {
        Self(*secret.as_bytes())
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootKey(<redacted>)")
    }
}

/// Current position in the symmetric ratchet.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ChainKey([u8; KEY_SIZE]);

impl ChainKey {
    /// Wrap raw bytes as a chain key.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChainKey(<redacted>)")
    }
}

/// One-time symmetric key handed to the message cipher.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageKey([u8; KEY_SIZE]);

impl MessageKey {
    /// Wrap raw bytes as a message key (e.g. a key received over the API).
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageKey(<redacted>)")
    }
}

fn tagged_hash(key: &[u8; KEY_SIZE], tag: u8) -> [u8; KEY_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update([tag]);
    hasher.finalize().into()
}

/// Derive the message key for the current chain position.
pub fn derive_message_key(chain_key: &ChainKey) -> MessageKey {
    MessageKey(tagged_hash(&chain_key.0, MESSAGE_KEY_TAG))
}

/// Derive the next chain key.
pub fn advance_chain_key(chain_key: &ChainKey) -> ChainKey {
    ChainKey(tagged_hash(&chain_key.0, CHAIN_KEY_TAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivations_are_deterministic() {
        let ck = ChainKey::from_bytes([9u8; KEY_SIZE]);
        assert_eq!(derive_message_key(&ck).as_bytes(), derive_message_key(&ck).as_bytes());
        assert_eq!(advance_chain_key(&ck).as_bytes(), advance_chain_key(&ck).as_bytes());
    }

    #[test]
    fn message_and_chain_outputs_differ() {
        let ck = ChainKey::from_bytes([0u8; KEY_SIZE]);
        assert_ne!(derive_message_key(&ck).as_bytes(), advance_chain_key(&ck).as_bytes());
    }

    #[test]
    fn initial_chain_key_differs_from_tagged_outputs() {
        let root = RootKey([5u8; KEY_SIZE]);
        let ck = root.initial_chain_key();
        let as_chain = ChainKey::from_bytes(*root.as_bytes());

        assert_ne!(ck.as_bytes(), derive_message_key(&as_chain).as_bytes());
        assert_ne!(ck.as_bytes(), advance_chain_key(&as_chain).as_bytes());
    }

    #[test]
    fn zero_chain_key_vectors() {
        let ck = ChainKey::from_bytes([0u8; KEY_SIZE]);
        assert_eq!(
            hex::encode(derive_message_key(&ck).as_bytes()),
            "1fd4247443c9440cb3c48c28851937196bc156032d70a96c98e127ecb347e45f"
        );
        assert_eq!(
            hex::encode(advance_chain_key(&ck).as_bytes()),
            "58cc2f44d3a27866874701fbad573da9ad1cfd88fa3145531c822f20a58beea1"
        );
        assert_eq!(
            hex::encode(RootKey([0u8; KEY_SIZE]).initial_chain_key().as_bytes()),
            "66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925"
        );
    }
}
