use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Minimum time between two key-set fetches triggered by unknown key ids.
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the key-set cache. Callers treat every variant as "no key".
#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("signing key {0:?} not found in key set")]
    KeyNotFound(String),

    #[error("failed to fetch key set: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("key set endpoint returned status {0}")]
    Status(u16),

    #[error("failed to decode key set: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
}

/// Public key material for one `kid`, immutable once fetched.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub key_type: KeyType,
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Parses one entry of a `keys` array. Returns `None` for non-RSA or
    /// malformed entries so a single bad key never poisons the whole set.
    fn from_jwk(entry: Value) -> Option<Self> {
        let jwk: RawJwk = serde_json::from_value(entry).ok()?;
        if jwk.kty != "RSA" || jwk.kid.is_empty() {
            return None;
        }

        let modulus = URL_SAFE_NO_PAD.decode(&jwk.n).ok()?;
        let exponent = URL_SAFE_NO_PAD.decode(&jwk.e).ok()?;
        if modulus.is_empty() || exponent.is_empty() {
            return None;
        }
        let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).ok()?;

        Some(Self {
            key_id: jwk.kid,
            key_type: KeyType::Rsa,
            modulus,
            exponent,
            decoding_key,
        })
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("key_type", &self.key_type)
            .field("modulus_len", &self.modulus.len())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RawJwk {
    kty: String,
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct KeySetDocument {
    #[serde(default)]
    keys: Vec<Value>,
}

/// Anything that can hand out a verification key for a token's `kid`.
#[async_trait]
pub trait KeyLookup: Send + Sync {
    async fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeySetError>;
}

#[derive(Default)]
struct KeySetState {
    keys: HashMap<String, Arc<SigningKey>>,
    last_fetch: Option<Instant>,
}

/// In-memory cache of the identity provider's published signing keys.
///
/// Lookups hit the cache under a shared lock. A miss may trigger a
/// refetch of the whole set, but only once per cooldown window, so tokens
/// carrying fabricated key ids cannot drive unbounded outbound traffic.
/// A refresh replaces the map wholesale; keys from different fetches
/// never coexist.
pub struct KeySetCache {
    url: String,
    client: reqwest::Client,
    cooldown: Duration,
    state: RwLock<KeySetState>,
    // Serializes refresh attempts so concurrent misses share one fetch.
    refresh_gate: Mutex<()>,
}

impl KeySetCache {
    pub fn new(url: impl Into<String>) -> Result<Self, KeySetError> {
        Self::with_settings(url, DEFAULT_REFRESH_COOLDOWN, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_settings(url: impl Into<String>, cooldown: Duration, fetch_timeout: Duration) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            cooldown,
            state: RwLock::new(KeySetState::default()),
            refresh_gate: Mutex::new(()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeySetError> {
        // Fast path
        if let Some(key) = self.cached(key_id).await {
            return Ok(key);
        }
        if !self.refresh_permitted().await {
            return Err(KeySetError::KeyNotFound(key_id.to_string()));
        }

        {
            let _gate = self.refresh_gate.lock().await;

            // Another caller may have refreshed while we waited for the gate.
            if let Some(key) = self.cached(key_id).await {
                return Ok(key);
            }
            if !self.refresh_permitted().await {
                return Err(KeySetError::KeyNotFound(key_id.to_string()));
            }

            self.refresh().await?;
        }

        self.cached(key_id)
            .await
            .ok_or_else(|| KeySetError::KeyNotFound(key_id.to_string()))
    }

    /// Number of keys from the most recent successful fetch.
    pub async fn len(&self) -> usize {
        self.state.read().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn cached(&self, key_id: &str) -> Option<Arc<SigningKey>> {
        self.state.read().await.keys.get(key_id).cloned()
    }

    async fn refresh_permitted(&self) -> bool {
        match self.state.read().await.last_fetch {
            Some(at) => at.elapsed() > self.cooldown,
            None => true,
        }
    }

    async fn refresh(&self) -> Result<(), KeySetError> {
        let keys = self.fetch().await?;
        tracing::debug!(url = %self.url, keys = keys.len(), "refreshed signing key set");

        let mut state = self.state.write().await;
        state.keys = keys;
        state.last_fetch = Some(Instant::now());
        Ok(())
    }

    async fn fetch(&self) -> Result<HashMap<String, Arc<SigningKey>>, KeySetError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KeySetError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let document: KeySetDocument =
            serde_json::from_slice(&body).map_err(|e| KeySetError::Decode(e.to_string()))?;

        Ok(parse_keys(document))
    }
}

#[async_trait]
impl KeyLookup for KeySetCache {
    async fn get_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeySetError> {
        KeySetCache::get_key(self, key_id).await
    }
}

fn parse_keys(document: KeySetDocument) -> HashMap<String, Arc<SigningKey>> {
    document
        .keys
        .into_iter()
        .filter_map(SigningKey::from_jwk)
        .map(|key| (key.key_id.clone(), Arc::new(key)))
        .collect()
}
