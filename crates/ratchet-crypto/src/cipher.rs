//! Message sealing with a derived message key.
//!
//! AES-256-GCM over a single message. The sealed layout is
//! `nonce (12) ‖ ciphertext ‖ tag (16)`. The nonce is supplied by the caller;
//! since every message key is used exactly once, a random nonce per key is
//! sufficient.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{CryptoError, chain::MessageKey};

/// AES-GCM nonce size.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

fn cipher_for(key: &MessageKey) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Encryption)
}

/// Seal `plaintext` under `key`, prepending `nonce` to the output.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the AEAD rejects the input.
pub fn seal(
    key: &MessageKey,
    nonce: [u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = cipher_for(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open data produced by [`seal`].
///
/// # Errors
///
/// - `CryptoError::InvalidCiphertext` if `sealed` cannot hold a nonce and tag
/// - `CryptoError::Decryption` if authentication fails
pub fn open(key: &MessageKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let min = NONCE_SIZE + TAG_SIZE;
    if sealed.len() < min {
        return Err(CryptoError::InvalidCiphertext { len: sealed.len(), min });
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    cipher_for(key)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}
