//! Key-exchange API.
//!
//! Request/response types for the HTTP boundary and the
//! [`KeyExchangeService`] that maps them onto a [`SessionStore`]. The service
//! is transport-free so it can be exercised directly in tests; the axum
//! handlers in the crate root only unwrap extractors and call into it.
//!
//! All binary values cross the boundary as standard Base64. JSON field names
//! are camelCase.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ratchet_core::{Environment, RatchetError, SessionId, SessionStore};
use ratchet_crypto::KEY_SIZE;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::ServerError;

/// Response to `POST key-exchange/init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    /// New session identifier
    pub session_id: String,
    /// Initial local public key (Base64)
    pub public_key: String,
}

/// Body of `POST key-exchange/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    /// Session to ratchet
    pub session_id: String,
    /// Peer's public key (Base64)
    pub public_key: String,
}

/// Response to `POST key-exchange/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    /// Always true; failures are reported as error responses
    pub success: bool,
    /// Echo of the ratcheted session
    pub session_id: String,
    /// Local public key generated by this ratchet step (Base64)
    pub public_key: String,
}

/// Response to `GET public-key/{sessionId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    /// Current local public key (Base64)
    pub public_key: String,
}

/// Body of `POST message-key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKeyRequest {
    /// Session to derive from
    pub session_id: String,
}

/// Response to `POST message-key`.
///
/// # Security
///
/// - **Debug Redaction**: The `Debug` impl redacts `key` so a logged
///   response never carries key material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKeyResponse {
    /// Raw one-time symmetric key (Base64)
    pub key: String,
}

impl std::fmt::Debug for MessageKeyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKeyResponse")
            .field("key", &format!("<redacted {} chars>", self.key.len()))
            .finish()
    }
}

/// Cipher a standalone symmetric key is generated for.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// Response to `GET key/symmetric`.
///
/// # Security
///
/// - **Debug Redaction**: The `Debug` impl redacts `key`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymmetricKeyResponse {
    /// Fresh random key (Base64)
    pub key: String,
    /// Always [`SYMMETRIC_ALGORITHM`]
    pub algorithm: String,
}

impl std::fmt::Debug for SymmetricKeyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKeyResponse")
            .field("key", &format!("<redacted {} chars>", self.key.len()))
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Identifiers that are not UUIDs were never issued, so they are reported
/// exactly like unknown ones.
fn parse_session_id(raw: &str) -> Result<SessionId, ServerError> {
    raw.parse()
        .map_err(|_| RatchetError::SessionNotFound { session_id: raw.to_string() }.into())
}

/// Transport-independent key-exchange operations.
pub struct KeyExchangeService<E>
where
    E: Environment,
{
    store: Arc<SessionStore<E>>,
}

impl<E> Clone for KeyExchangeService<E>
where
    E: Environment,
{
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<E> KeyExchangeService<E>
where
    E: Environment,
{
    /// Wrap a shared store.
    pub fn new(store: Arc<SessionStore<E>>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<SessionStore<E>> {
        &self.store
    }

    /// Start a new session.
    pub fn init(&self) -> Result<InitResponse, ServerError> {
        let (session_id, public_key) = self.store.create_session()?;
        Ok(InitResponse {
            session_id: session_id.to_string(),
            public_key: BASE64.encode(public_key.as_bytes()),
        })
    }

    /// Ratchet a session with the peer's key and return the new local key.
    pub fn complete(&self, request: &CompleteRequest) -> Result<CompleteResponse, ServerError> {
        let id = parse_session_id(&request.session_id)?;
        let remote = BASE64
            .decode(&request.public_key)
            .map_err(|e| ServerError::BadRequest(format!("publicKey is not valid base64: {e}")))?;

        let public_key = self.store.establish(&id, &remote)?;
        Ok(CompleteResponse {
            success: true,
            session_id: id.to_string(),
            public_key: BASE64.encode(public_key.as_bytes()),
        })
    }

    /// Current public key of a session.
    pub fn public_key(&self, session_id: &str) -> Result<PublicKeyResponse, ServerError> {
        let id = parse_session_id(session_id)?;
        let public_key = self.store.public_key(&id)?;
        Ok(PublicKeyResponse { public_key: BASE64.encode(public_key.as_bytes()) })
    }

    /// Derive the next message key of a session.
    pub fn message_key(
        &self,
        request: &MessageKeyRequest,
    ) -> Result<MessageKeyResponse, ServerError> {
        let id = parse_session_id(&request.session_id)?;
        let key = self.store.derive_message_key(&id)?;
        Ok(MessageKeyResponse { key: BASE64.encode(key.as_bytes()) })
    }

    /// Generate a standalone AES-256-GCM key, unrelated to any session.
    pub fn symmetric_key(&self) -> Result<SymmetricKeyResponse, ServerError> {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        self.store.env().random_bytes(&mut *key).map_err(RatchetError::from)?;
        Ok(SymmetricKeyResponse {
            key: BASE64.encode(*key),
            algorithm: SYMMETRIC_ALGORITHM.to_string(),
        })
    }

    /// Destroy a session.
    pub fn remove(&self, session_id: &str) -> Result<(), ServerError> {
        let id = parse_session_id(session_id)?;
        if self.store.remove(&id) {
            Ok(())
        } else {
            Err(RatchetError::SessionNotFound { session_id: id.to_string() }.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_use_camel_case() {
        let response = InitResponse { session_id: "id".to_string(), public_key: "pk".to_string() };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"sessionId":"id","publicKey":"pk"}"#);
    }

    #[test]
    fn complete_request_parses_camel_case() {
        let request: CompleteRequest =
            serde_json::from_str(r#"{"sessionId":"abc","publicKey":"AAAA"}"#).unwrap();
        assert_eq!(request.session_id, "abc");
        assert_eq!(request.public_key, "AAAA");
    }

    #[test]
    fn message_key_debug_is_redacted() {
        let response = MessageKeyResponse { key: "c2VjcmV0".to_string() };
        let rendered = format!("{response:?}");
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("redacted 8 chars"));
    }

    #[test]
    fn symmetric_key_response_shape() {
        let response =
            SymmetricKeyResponse { key: "a2V5".to_string(), algorithm: "AES-256-GCM".to_string() };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"key":"a2V5","algorithm":"AES-256-GCM"}"#);
        assert!(!format!("{response:?}").contains("a2V5"));
    }

    #[test]
    fn malformed_session_id_is_not_found() {
        let err = parse_session_id("nonexistent-id").unwrap_err();
        assert!(matches!(err, ServerError::Ratchet(RatchetError::SessionNotFound { .. })));
    }
}
