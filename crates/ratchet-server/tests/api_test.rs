//! Key-exchange API tests
//!
//! Service-level tests call `KeyExchangeService` directly; router tests drive
//! the axum `Router` in-process with `tower::ServiceExt::oneshot`.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ratchet_core::{EntropyError, Environment, SessionStore, StoreConfig};
use ratchet_crypto::{MessageKey, NONCE_SIZE, open, seal};
use ratchet_server::{
    KeyExchangeService, Server, ServerError, ServerRuntimeConfig, SystemEnv,
    api::{CompleteRequest, MessageKeyRequest, SYMMETRIC_ALGORITHM},
    router, run_sweeper,
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn service() -> KeyExchangeService<SystemEnv> {
    service_with(StoreConfig::default())
}

fn service_with(config: StoreConfig) -> KeyExchangeService<SystemEnv> {
    KeyExchangeService::new(Arc::new(SessionStore::new(SystemEnv::new(), config)))
}

fn message_key(b64: &str) -> MessageKey {
    let bytes: [u8; 32] = BASE64.decode(b64).unwrap().try_into().unwrap();
    MessageKey::from_bytes(bytes)
}

#[test]
fn init_returns_session_and_raw_public_key() {
    let service = service();
    let response = service.init().unwrap();

    assert_eq!(BASE64.decode(&response.public_key).unwrap().len(), 32);
    let fetched = service.public_key(&response.session_id).unwrap();
    assert_eq!(fetched.public_key, response.public_key);
}

#[test]
fn unknown_session_id_is_not_found() {
    let err = service().public_key("nonexistent-id").unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[test]
fn complete_rejects_bad_base64() {
    let service = service();
    let init = service.init().unwrap();

    let err = service
        .complete(&CompleteRequest {
            session_id: init.session_id,
            public_key: "not base64!!".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, ServerError::BadRequest(_)));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn complete_rejects_garbage_key_and_keeps_session() {
    let service = service();
    let init = service.init().unwrap();

    let err = service
        .complete(&CompleteRequest {
            session_id: init.session_id.clone(),
            public_key: BASE64.encode(b"garbage"),
        })
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    let current = service.public_key(&init.session_id).unwrap();
    assert_eq!(current.public_key, init.public_key);
}

#[test]
fn complete_rejects_point_off_curve() {
    let service = service();
    let init = service.init().unwrap();
    let mut twist = [0u8; 32];
    twist[0] = 2;

    let err = service
        .complete(&CompleteRequest {
            session_id: init.session_id.clone(),
            public_key: BASE64.encode(twist),
        })
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(service.public_key(&init.session_id).unwrap().public_key, init.public_key);
}

#[test]
fn symmetric_keys_are_fresh_aes_keys() {
    let service = service();
    let first = service.symmetric_key().unwrap();
    let second = service.symmetric_key().unwrap();

    assert_eq!(first.algorithm, SYMMETRIC_ALGORITHM);
    assert_ne!(first.key, second.key);

    let sealed = seal(&message_key(&first.key), [0; NONCE_SIZE], b"standalone").unwrap();
    assert_eq!(open(&message_key(&first.key), &sealed).unwrap(), b"standalone");
    assert!(service.store().is_empty());
}

#[test]
fn message_key_before_complete_conflicts() {
    let service = service();
    let init = service.init().unwrap();

    let err = service
        .message_key(&MessageKeyRequest { session_id: init.session_id })
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);
}

#[test]
fn two_services_derive_matching_keys() {
    let alice = service();
    let bob = service();

    let a = alice.init().unwrap();
    let b = bob.init().unwrap();

    let b_done = bob
        .complete(&CompleteRequest {
            session_id: b.session_id.clone(),
            public_key: a.public_key.clone(),
        })
        .unwrap();
    let a_done = alice
        .complete(&CompleteRequest {
            session_id: a.session_id.clone(),
            public_key: b.public_key.clone(),
        })
        .unwrap();

    assert!(a_done.success && b_done.success);
    assert_eq!(a_done.session_id, a.session_id);
    assert_ne!(a_done.public_key, a.public_key);

    for i in 0..5u8 {
        let ka = alice.message_key(&MessageKeyRequest { session_id: a.session_id.clone() });
        let kb = bob.message_key(&MessageKeyRequest { session_id: b.session_id.clone() });
        let (ka, kb) = (ka.unwrap(), kb.unwrap());
        assert_eq!(ka.key, kb.key);

        let sealed = seal(&message_key(&ka.key), [i; NONCE_SIZE], b"hello").unwrap();
        assert_eq!(open(&message_key(&kb.key), &sealed).unwrap(), b"hello");
    }
}

#[test]
fn successive_message_keys_differ() {
    let alice = service();
    let bob = service();
    let a = alice.init().unwrap();
    let b = bob.init().unwrap();
    alice
        .complete(&CompleteRequest { session_id: a.session_id.clone(), public_key: b.public_key })
        .unwrap();

    let request = MessageKeyRequest { session_id: a.session_id };
    let first = alice.message_key(&request).unwrap();
    let second = alice.message_key(&request).unwrap();
    assert_ne!(first.key, second.key);
}

#[test]
fn remove_deletes_once() {
    let service = service();
    let init = service.init().unwrap();

    service.remove(&init.session_id).unwrap();
    assert_eq!(service.remove(&init.session_id).unwrap_err().status(), StatusCode::NOT_FOUND);
    assert_eq!(
        service.public_key(&init.session_id).unwrap_err().status(),
        StatusCode::NOT_FOUND
    );
}

#[test]
fn full_store_is_unavailable() {
    let service = service_with(StoreConfig { max_sessions: Some(1), ..Default::default() });
    service.init().unwrap();

    let err = service.init().unwrap_err();
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn router_runs_full_exchange() {
    let alice = router(service());
    let bob = router(service());

    let (status, a) = send(&alice, empty("POST", "/api/encryption/key-exchange/init")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, b) = send(&bob, empty("POST", "/api/encryption/key-exchange/init")).await;

    let (status, done) = send(
        &alice,
        post_json(
            "/api/encryption/key-exchange/complete",
            &json!({ "sessionId": a["sessionId"], "publicKey": b["publicKey"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["success"], json!(true));
    assert_eq!(done["sessionId"], a["sessionId"]);

    send(
        &bob,
        post_json(
            "/api/encryption/key-exchange/complete",
            &json!({ "sessionId": b["sessionId"], "publicKey": a["publicKey"] }),
        ),
    )
    .await;

    let (status, ka) = send(
        &alice,
        post_json("/api/encryption/message-key", &json!({ "sessionId": a["sessionId"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, kb) =
        send(&bob, post_json("/api/encryption/message-key", &json!({ "sessionId": b["sessionId"] })))
            .await;
    assert_eq!(ka["key"], kb["key"]);

    let uri = format!("/api/encryption/public-key/{}", a["sessionId"].as_str().unwrap());
    let (status, pk) = send(&alice, empty("GET", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pk["publicKey"], done["publicKey"]);
}

#[tokio::test]
async fn router_reports_errors_as_json() {
    let app = router(service());

    let (status, body) = send(&app, empty("GET", "/api/encryption/public-key/nonexistent-id")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nonexistent-id"));

    let (status, body) = send(
        &app,
        post_json("/api/encryption/key-exchange/complete", &json!({ "sessionId": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn router_deletes_sessions() {
    let app = router(service());
    let (_, init) = send(&app, empty("POST", "/api/encryption/key-exchange/init")).await;
    let uri = format!("/api/encryption/sessions/{}", init["sessionId"].as_str().unwrap());

    let (status, body) = send(&app, empty("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(&app, empty("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn router_issues_symmetric_keys() {
    let app = router(service());

    let (status, body) = send(&app, empty("GET", "/api/encryption/key/symmetric")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["algorithm"], json!("AES-256-GCM"));
    let key = BASE64.decode(body["key"].as_str().unwrap()).unwrap();
    assert_eq!(key.len(), 32);

    let (_, again) = send(&app, empty("GET", "/api/encryption/key/symmetric")).await;
    assert_ne!(again["key"], body["key"]);
}

#[test]
fn default_runtime_config_is_valid() {
    ServerRuntimeConfig::default().validate().unwrap();
}

#[test]
fn zero_valued_settings_are_rejected() {
    let zero_sweep = StoreConfig { sweep_interval: Duration::ZERO, ..Default::default() };
    let zero_ttl = StoreConfig { session_ttl: Some(Duration::ZERO), ..Default::default() };
    let zero_cap = StoreConfig { max_sessions: Some(0), ..Default::default() };

    for store in [zero_sweep, zero_ttl, zero_cap] {
        let config = ServerRuntimeConfig { store, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ServerError::Config(_)), "{err}");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

#[tokio::test]
async fn bind_refuses_invalid_config() {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        store: StoreConfig { sweep_interval: Duration::ZERO, ..Default::default() },
    };
    let err = Server::bind(config).await.err().unwrap();
    assert!(matches!(err, ServerError::Config(_)));
}

#[tokio::test]
async fn bind_accepts_ephemeral_port() {
    let config =
        ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };
    let server = Server::bind(config).await.unwrap();
    assert_ne!(server.local_addr().unwrap().port(), 0);
}

/// Clock that moves only when the sweeper sleeps.
#[derive(Clone)]
struct ManualEnv {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Environment for ManualEnv {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let offset = Arc::clone(&self.offset);
        async move {
            *offset.lock().unwrap() += duration;
            tokio::task::yield_now().await;
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), EntropyError> {
        getrandom::fill(buffer).map_err(|e| EntropyError { reason: e.to_string() })
    }
}

#[tokio::test]
async fn sweeper_evicts_idle_sessions() {
    let env = ManualEnv { start: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) };
    let config = StoreConfig {
        session_ttl: Some(Duration::from_secs(60)),
        sweep_interval: Duration::from_secs(30),
        max_sessions: None,
    };
    let store = Arc::new(SessionStore::new(env, config));
    store.create_session().unwrap();

    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&store)));
    for _ in 0..100 {
        if store.is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    sweeper.abort();

    assert!(store.is_empty());
}
