//! Primitive error types.

use thiserror::Error;

/// Errors from the cryptographic primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Remote public key is malformed or unusable for agreement.
    #[error("invalid public key: {reason}")]
    InvalidKey {
        /// Why the key was rejected.
        reason: String,
    },

    /// AEAD sealing failed.
    #[error("encryption failed")]
    Encryption,

    /// AEAD authentication failed (tampered data or wrong key).
    #[error("decryption failed")]
    Decryption,

    /// Sealed data is too short to contain a nonce and tag.
    #[error("invalid ciphertext: {len} bytes, need at least {min}")]
    InvalidCiphertext {
        /// Length that was supplied.
        len: usize,
        /// Minimum acceptable length.
        min: usize,
    },
}

impl CryptoError {
    /// Returns true if the caller supplied bad input, as opposed to a
    /// failure inside the primitive itself.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::InvalidKey { .. } | Self::Decryption | Self::InvalidCiphertext { .. } => true,
            Self::Encryption => false,
        }
    }
}
