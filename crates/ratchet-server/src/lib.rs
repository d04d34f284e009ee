//! Ratchet key-exchange server.
//!
//! This crate exposes a [`SessionStore`] over HTTP using:
//! - Axum for routing and JSON bodies
//! - Tokio for the async runtime and the expiry sweeper
//! - System time and cryptographic RNG
//!
//! ## Architecture
//!
//! ```text
//! ratchet-server
//!   ├─ SystemEnv            (production Environment impl)
//!   ├─ router()             (axum routes under /api/encryption)
//!   ├─ KeyExchangeService   (Base64/JSON ↔ store operations)
//!   ├─ run_sweeper()        (periodic idle-session eviction)
//!   └─ SessionStore         (ratchet-core)
//! ```
//!
//! ## Routes
//!
//! | Method | Path                                      | Success |
//! |--------|-------------------------------------------|---------|
//! | POST   | `/api/encryption/key-exchange/init`       | 200     |
//! | POST   | `/api/encryption/key-exchange/complete`   | 200     |
//! | GET    | `/api/encryption/public-key/{sessionId}`  | 200     |
//! | POST   | `/api/encryption/message-key`             | 200     |
//! | DELETE | `/api/encryption/sessions/{sessionId}`    | 204     |
//! | GET    | `/api/encryption/key/symmetric`           | 200     |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
mod error;
mod system_env;

use std::sync::Arc;

pub use api::KeyExchangeService;
use api::{
    CompleteRequest, CompleteResponse, InitResponse, MessageKeyRequest, MessageKeyResponse,
    PublicKeyResponse, SymmetricKeyResponse,
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{delete, get, post},
};
pub use error::ServerError;
use ratchet_core::{Environment, SessionStore, StoreConfig};
pub use system_env::SystemEnv;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Session lifetime and capacity policy
    pub store: StoreConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:8080".to_string(), store: StoreConfig::default() }
    }
}

impl ServerRuntimeConfig {
    /// Reject settings the store cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` for a zero sweep interval, a zero
    /// session TTL, or a zero session cap.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.store.sweep_interval.is_zero() {
            return Err(ServerError::Config("sweep interval must be positive".to_string()));
        }
        if self.store.session_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ServerError::Config(
                "session TTL must be positive; use no TTL to disable expiry".to_string(),
            ));
        }
        if self.store.max_sessions == Some(0) {
            return Err(ServerError::Config("max sessions must be positive".to_string()));
        }
        Ok(())
    }
}

/// Build the HTTP router for a key-exchange service.
pub fn router<E>(service: KeyExchangeService<E>) -> Router
where
    E: Environment,
{
    let api = Router::new()
        .route("/key-exchange/init", post(init::<E>))
        .route("/key-exchange/complete", post(complete::<E>))
        .route("/public-key/:session_id", get(public_key::<E>))
        .route("/message-key", post(message_key::<E>))
        .route("/sessions/:session_id", delete(remove_session::<E>))
        .route("/key/symmetric", get(symmetric_key::<E>));

    Router::new().nest("/api/encryption", api).with_state(service)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload.map(|Json(value)| value).map_err(|e| ServerError::BadRequest(e.body_text()))
}

async fn init<E>(
    State(service): State<KeyExchangeService<E>>,
) -> Result<Json<InitResponse>, ServerError>
where
    E: Environment,
{
    service.init().map(Json)
}

async fn complete<E>(
    State(service): State<KeyExchangeService<E>>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<CompleteResponse>, ServerError>
where
    E: Environment,
{
    let request = body(payload)?;
    service.complete(&request).map(Json)
}

async fn public_key<E>(
    State(service): State<KeyExchangeService<E>>,
    Path(session_id): Path<String>,
) -> Result<Json<PublicKeyResponse>, ServerError>
where
    E: Environment,
{
    service.public_key(&session_id).map(Json)
}

async fn message_key<E>(
    State(service): State<KeyExchangeService<E>>,
    payload: Result<Json<MessageKeyRequest>, JsonRejection>,
) -> Result<Json<MessageKeyResponse>, ServerError>
where
    E: Environment,
{
    let request = body(payload)?;
    service.message_key(&request).map(Json)
}

async fn remove_session<E>(
    State(service): State<KeyExchangeService<E>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ServerError>
where
    E: Environment,
{
    service.remove(&session_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn symmetric_key<E>(
    State(service): State<KeyExchangeService<E>>,
) -> Result<Json<SymmetricKeyResponse>, ServerError>
where
    E: Environment,
{
    service.symmetric_key().map(Json)
}

/// Evict idle sessions every `sweep_interval`, forever.
///
/// Sleeping goes through the store's environment so simulated clocks drive
/// the sweep in tests.
pub async fn run_sweeper<E>(store: Arc<SessionStore<E>>)
where
    E: Environment,
{
    let interval = store.config().sweep_interval;
    loop {
        store.env().sleep(interval).await;
        let evicted = store.evict_expired();
        if evicted > 0 {
            tracing::info!(evicted, remaining = store.len(), "swept idle sessions");
        }
    }
}

/// Production ratchet server.
///
/// Wraps a [`KeyExchangeService`] with a TCP listener and system environment.
pub struct Server {
    listener: tokio::net::TcpListener,
    service: KeyExchangeService<SystemEnv>,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or binding to the
    /// address fails.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let store = Arc::new(SessionStore::new(SystemEnv::new(), config.store));
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

        Ok(Self { listener, service: KeyExchangeService::new(store) })
    }

    /// Serve requests until the listener fails.
    ///
    /// The expiry sweeper runs alongside when sessions have a TTL.
    pub async fn run(self) -> Result<(), ServerError> {
        let store = Arc::clone(self.service.store());
        let sweeper = store
            .config()
            .session_ttl
            .is_some()
            .then(|| tokio::spawn(run_sweeper(Arc::clone(&store))));

        tracing::info!("Server starting on {}", self.listener.local_addr()?);
        let result = axum::serve(self.listener, router(self.service)).await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        result.map_err(ServerError::from)
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}
