//! Ratchet Cryptographic Primitives
//!
//! This crate provides the stateless building blocks of the key ratchet.
//!
//! # Design
//!
//! All functions in this crate are pure - they have no side effects and
//! produce deterministic outputs given the same inputs. Random bytes required
//! for key generation or sealing must be provided by the caller, enabling:
//!
//! - Deterministic testing with seeded RNG
//! - Fallible entropy sources that report failure instead of degrading
//! - No coupling to session or storage abstractions
//!
//! # Components
//!
//! - [`agreement`]: X25519 key pairs and shared secret computation
//! - [`chain`]: Domain-separated root/chain/message key derivation
//! - [`cipher`]: AES-256-GCM sealing with a derived message key
//!
//! # Security Properties
//!
//! - Forward Secrecy: Chain keys only move forward through SHA-256
//! - Domain Separation: Message and chain derivations use distinct tags
//! - Hygiene: Every secret type is zeroized on drop and redacted in `Debug`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agreement;
pub mod chain;
pub mod cipher;
mod error;

pub use agreement::{KeyPair, PUBLIC_KEY_SIZE, PublicKey, SECRET_KEY_SIZE, SharedSecret};
pub use chain::{
    CHAIN_KEY_TAG, ChainKey, KEY_SIZE, MESSAGE_KEY_TAG, MessageKey, RootKey, advance_chain_key,
    derive_message_key,
};
pub use cipher::{NONCE_SIZE, TAG_SIZE, open, seal};
pub use error::CryptoError;
