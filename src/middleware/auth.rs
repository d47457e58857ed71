use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::auth::{KeyLookup, TokenVerifier};
use crate::error::ApiError;

pub const HEALTH_PATH: &str = "/health";
pub const AUTH_ROUTES_PREFIX: &str = "/api/v1/auth/";
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Authenticated caller, placed in the request extensions by
/// [`auth_middleware`]. Handlers on protected routes take it as an extractor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("authentication required"))
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("user not found")]
    NotFound,

    #[error("user resolution failed: {0}")]
    Internal(anyhow::Error),
}

/// Maps the identity provider's subject to our internal user id.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve_user_id(&self, subject: &str) -> Result<String, ResolveError>;
}

/// How callers are identified. Fixed when the process starts.
#[derive(Clone)]
pub enum AuthMode {
    /// Trust the `X-User-ID` header. Local development only.
    DevBypass,
    VerifiedToken {
        keys: Arc<dyn KeyLookup>,
        verifier: TokenVerifier,
        resolver: Arc<dyn UserResolver>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthSetupError {
    #[error("a signing key set is required when dev mode is disabled")]
    MissingKeySet,

    #[error("a user resolver is required when dev mode is disabled")]
    MissingResolver,

    #[error("an expected {0} is required when dev mode is disabled")]
    MissingClaimExpectation(&'static str),
}

/// Loose wiring handed over by `main`; [`Authenticator::new`] turns it into
/// an [`AuthMode`] or refuses to start.
#[derive(Default)]
pub struct AuthConfig {
    pub dev_mode: bool,
    pub key_set: Option<Arc<dyn KeyLookup>>,
    pub issuer: String,
    pub audience: String,
    /// Empty keeps the RS256-only default.
    pub algorithms: Vec<Algorithm>,
    pub token_use: Option<String>,
    pub resolver: Option<Arc<dyn UserResolver>>,
}

pub struct Authenticator {
    mode: AuthMode,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Result<Self, AuthSetupError> {
        if config.dev_mode {
            return Ok(Self::from_mode(AuthMode::DevBypass));
        }

        let keys = config.key_set.ok_or(AuthSetupError::MissingKeySet)?;
        let resolver = config.resolver.ok_or(AuthSetupError::MissingResolver)?;
        if config.issuer.is_empty() {
            return Err(AuthSetupError::MissingClaimExpectation("issuer"));
        }
        if config.audience.is_empty() {
            return Err(AuthSetupError::MissingClaimExpectation("audience"));
        }

        let mut verifier = TokenVerifier::new(config.issuer, config.audience);
        if !config.algorithms.is_empty() {
            verifier = verifier.with_algorithms(&config.algorithms);
        }
        if let Some(token_use) = config.token_use {
            verifier = verifier.with_token_use(token_use);
        }

        Ok(Self::from_mode(AuthMode::VerifiedToken {
            keys,
            verifier,
            resolver,
        }))
    }

    pub fn from_mode(mode: AuthMode) -> Self {
        Self { mode }
    }

    pub fn is_dev_bypass(&self) -> bool {
        matches!(self.mode, AuthMode::DevBypass)
    }

    /// Decide who is calling. Rejections carry the response to send as-is.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
        match &self.mode {
            AuthMode::DevBypass => dev_user(headers),
            AuthMode::VerifiedToken { keys, verifier, resolver } => {
                let token = extract_bearer_token(headers)?;

                // Which check failed is deliberately not reported.
                let claims = verifier
                    .verify(token, keys.as_ref())
                    .await
                    .map_err(|_| invalid_token())?;

                match resolver.resolve_user_id(&claims.subject).await {
                    Ok(user_id) if !user_id.is_empty() => Ok(AuthUser { user_id }),
                    Ok(_) => {
                        tracing::error!("user resolution returned an empty user id");
                        Err(ApiError::internal())
                    }
                    Err(ResolveError::NotFound) => Err(invalid_token()),
                    Err(ResolveError::Internal(err)) => {
                        tracing::error!(error = %err, "user resolution failed");
                        Err(ApiError::internal())
                    }
                }
            }
        }
    }
}

/// Authentication middleware: exempts public paths, otherwise attaches an
/// [`AuthUser`] to the request or answers with 401/500.
pub async fn auth_middleware(State(auth): State<Arc<Authenticator>>, mut request: Request, next: Next) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    match auth.authorize(request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

fn dev_user(headers: &HeaderMap) -> Result<AuthUser, ApiError> {
    headers
        .get(DEV_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|user_id| AuthUser {
            user_id: user_id.to_string(),
        })
        .ok_or_else(|| ApiError::unauthorized("X-User-ID header required in dev mode"))
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("authorization header required"))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))
}

fn invalid_token() -> ApiError {
    ApiError::unauthorized("invalid or expired token")
}

/// Health checks and the login/signup endpoints are reachable without
/// credentials. The path is normalised first so dot segments cannot smuggle
/// a protected route under the public prefix.
pub fn is_public_path(path: &str) -> bool {
    let clean = clean_path(path);
    clean == HEALTH_PATH || clean.starts_with(AUTH_ROUTES_PREFIX)
}

/// Lexical normalisation of an absolute URL path: collapses repeated
/// slashes, drops `.` segments, resolves `..` and strips the trailing slash.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}
