#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower::ServiceExt;

use todo_api::app::{self, AppState};
use todo_api::auth::KeyLookup;
use todo_api::database::{InMemoryTodoRepository, InMemoryUserRepository, UserStoreResolver};
use todo_api::middleware::{AuthConfig, Authenticator, UserResolver};
use todo_api::services::TodoService;

pub const ISSUER: &str = "https://cognito-idp.ap-northeast-1.amazonaws.com/ap-northeast-1_pool1";
pub const AUDIENCE: &str = "client-1";

// ---------------------------------------------------------------------------
// Signing keys
// ---------------------------------------------------------------------------

pub struct TestKey {
    pub kid: &'static str,
    encoding: EncodingKey,
    jwk: Value,
}

impl TestKey {
    fn generate(kid: &'static str) -> Self {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate rsa key");
        let der = private.to_pkcs1_der().expect("encode rsa key");
        let encoding = EncodingKey::from_rsa_der(der.as_bytes());

        let jwk = json!({
            "kty": "RSA",
            "kid": kid,
            "alg": "RS256",
            "use": "sig",
            "n": URL_SAFE_NO_PAD.encode(private.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(private.e().to_bytes_be()),
        });

        Self { kid, encoding, jwk }
    }

    /// Public half as a key-set entry.
    pub fn jwk(&self) -> Value {
        self.jwk.clone()
    }

    /// RS256 token carrying this key's kid.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with(Algorithm::RS256, Some(self.kid), claims)
    }

    pub fn sign_with(&self, alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = kid.map(str::to_string);
        encode(&header, claims, &self.encoding).expect("sign token")
    }
}

// Key generation is slow in debug builds; share keys across tests in a binary.
static PRIMARY: OnceLock<TestKey> = OnceLock::new();
static SECONDARY: OnceLock<TestKey> = OnceLock::new();

pub fn primary_key() -> &'static TestKey {
    PRIMARY.get_or_init(|| TestKey::generate("primary-key"))
}

pub fn secondary_key() -> &'static TestKey {
    SECONDARY.get_or_init(|| TestKey::generate("secondary-key"))
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims that pass every check for `subject`.
pub fn valid_claims(subject: &str) -> Value {
    json!({
        "sub": subject,
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": now(),
        "exp": now() + 3600,
        "token_use": "id",
    })
}

/// Token with a structurally valid header and payload but no signature.
pub fn unsigned_token(alg: &str, kid: &str, claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": alg, "typ": "JWT", "kid": kid}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

// ---------------------------------------------------------------------------
// Key-set endpoint
// ---------------------------------------------------------------------------

struct KeySetEndpoint {
    fetches: AtomicUsize,
    status: AtomicU16,
    body: RwLock<String>,
}

/// Local key-set server that counts how often it is fetched.
pub struct KeySetServer {
    pub url: String,
    endpoint: Arc<KeySetEndpoint>,
    handle: JoinHandle<()>,
}

impl KeySetServer {
    pub async fn start(keys: Vec<Value>) -> Result<Self> {
        let endpoint = Arc::new(KeySetEndpoint {
            fetches: AtomicUsize::new(0),
            status: AtomicU16::new(200),
            body: RwLock::new(json!({ "keys": keys }).to_string()),
        });

        let router = Router::new()
            .route("/.well-known/jwks.json", get(serve_keys))
            .with_state(endpoint.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind key-set server")?;
        let addr: SocketAddr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            url: format!("http://{addr}/.well-known/jwks.json"),
            endpoint,
            handle,
        })
    }

    pub fn fetches(&self) -> usize {
        self.endpoint.fetches.load(Ordering::SeqCst)
    }

    pub fn publish(&self, keys: Vec<Value>) {
        *self.endpoint.body.write().unwrap() = json!({ "keys": keys }).to_string();
    }

    pub fn publish_raw(&self, body: &str) {
        *self.endpoint.body.write().unwrap() = body.to_string();
    }

    /// Answer every fetch with `status` (200 restores normal service).
    pub fn respond_with(&self, status: u16) {
        self.endpoint.status.store(status, Ordering::SeqCst);
    }
}

impl Drop for KeySetServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_keys(State(endpoint): State<Arc<KeySetEndpoint>>) -> Response {
    endpoint.fetches.fetch_add(1, Ordering::SeqCst);

    let status = StatusCode::from_u16(endpoint.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK);
    if status != StatusCode::OK {
        return (status, "unavailable").into_response();
    }

    let body = endpoint.body.read().unwrap().clone();
    (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response()
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub todos: Arc<InMemoryTodoRepository>,
    pub users: Arc<InMemoryUserRepository>,
}

fn build_app(auth: Authenticator, users: Arc<InMemoryUserRepository>) -> TestApp {
    let todos = Arc::new(InMemoryTodoRepository::new());
    let state = AppState::new(TodoService::new(todos.clone()));

    TestApp {
        router: app::router(state, Arc::new(auth)),
        todos,
        users,
    }
}

pub fn dev_app() -> TestApp {
    let auth = Authenticator::new(AuthConfig {
        dev_mode: true,
        ..Default::default()
    })
    .expect("dev mode needs no dependencies");

    build_app(auth, Arc::new(InMemoryUserRepository::new()))
}

/// Verified-token app resolving subjects against its in-memory user store.
pub fn verified_app(keys: Arc<dyn KeyLookup>) -> TestApp {
    let users = Arc::new(InMemoryUserRepository::new());
    let resolver = Arc::new(UserStoreResolver::new(users.clone()));
    build_app(verified_authenticator(keys, resolver), users)
}

pub fn verified_authenticator(keys: Arc<dyn KeyLookup>, resolver: Arc<dyn UserResolver>) -> Authenticator {
    Authenticator::new(AuthConfig {
        dev_mode: false,
        key_set: Some(keys),
        issuer: ISSUER.to_string(),
        audience: AUDIENCE.to_string(),
        resolver: Some(resolver),
        ..Default::default()
    })
    .expect("verified mode with all dependencies")
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub raw: String,
}

impl TestResponse {
    pub fn error_code(&self) -> &str {
        self.body["error"]["code"].as_str().unwrap_or_default()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let raw = String::from_utf8_lossy(&bytes).into_owned();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    TestResponse { status, body, raw }
}

pub fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
