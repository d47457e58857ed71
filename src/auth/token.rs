use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};
use serde::Deserialize;
use thiserror::Error;

use super::jwks::{KeyLookup, KeySetError};

/// Why a bearer token was rejected. Kept for tests and debugging only:
/// the gate collapses every variant into the same 401 response.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("token is not a well-formed JWT")]
    Malformed,

    #[error("algorithm {0:?} is not allowed")]
    AlgorithmNotAllowed(Algorithm),

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("no usable signing key: {0}")]
    KeyUnavailable(#[from] KeySetError),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("issuer mismatch")]
    InvalidIssuer,

    #[error("audience mismatch")]
    InvalidAudience,

    #[error("token_use mismatch")]
    InvalidTokenUse,

    #[error("missing or invalid claim: {0}")]
    InvalidClaims(String),

    #[error("subject claim missing or empty")]
    MissingSubject,
}

/// Payload of a token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: String,
    pub issuer: String,
    pub audience: String,
    pub expiry: DateTime<Utc>,
    pub token_use: Option<String>,
    pub key_id: String,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    iss: String,
    exp: i64,
    #[serde(default)]
    token_use: Option<String>,
}

/// Static verification policy: who must have issued the token, for whom,
/// and with which algorithms.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    issuer: String,
    audience: String,
    algorithms: Vec<Algorithm>,
    token_use: Option<String>,
}

impl TokenVerifier {
    /// Verifier pinned to RS256.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithms: vec![Algorithm::RS256],
            token_use: None,
        }
    }

    /// Widens the allow-list. Anything outside the RS family is dropped, so
    /// this can never re-admit `none`, HMAC or EC algorithms.
    pub fn with_algorithms(mut self, algorithms: &[Algorithm]) -> Self {
        self.algorithms = algorithms.iter().copied().filter(|alg| is_rsa_family(*alg)).collect();
        self
    }

    /// Additionally require the `token_use` claim (e.g. `"id"`).
    pub fn with_token_use(mut self, token_use: impl Into<String>) -> Self {
        self.token_use = Some(token_use.into());
        self
    }

    /// Runs the full pipeline: header parse, algorithm allow-list, key
    /// lookup, signature, standard claims, subject.
    pub async fn verify(&self, token: &str, keys: &dyn KeyLookup) -> Result<VerifiedClaims, VerificationError> {
        let header = decode_header(token).map_err(|_| VerificationError::Malformed)?;
        self.check_algorithm(&header)?;
        let key_id = header.kid.filter(|kid| !kid.is_empty()).ok_or(VerificationError::MissingKeyId)?;

        let key = keys.get_key(&key_id).await?;

        let data = decode::<RawClaims>(token, key.decoding_key(), &self.validation(header.alg))
            .map_err(|e| map_jwt_error(e.kind()))?;

        self.claims_from(data.claims, key_id)
    }

    /// Allow-list check on the declared algorithm. Runs before any key is
    /// looked up so algorithm-confusion tokens never reach the cache.
    pub fn check_algorithm(&self, header: &Header) -> Result<(), VerificationError> {
        if is_rsa_family(header.alg) && self.algorithms.contains(&header.alg) {
            Ok(())
        } else {
            Err(VerificationError::AlgorithmNotAllowed(header.alg))
        }
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.algorithms = vec![alg];
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation
    }

    fn claims_from(&self, raw: RawClaims, key_id: String) -> Result<VerifiedClaims, VerificationError> {
        // jsonwebtoken still accepts `exp == now`; expiry must be strictly ahead.
        if raw.exp <= Utc::now().timestamp() {
            return Err(VerificationError::Expired);
        }

        let subject = raw.sub.filter(|s| !s.is_empty()).ok_or(VerificationError::MissingSubject)?;

        if let Some(expected) = &self.token_use {
            if raw.token_use.as_deref() != Some(expected.as_str()) {
                return Err(VerificationError::InvalidTokenUse);
            }
        }

        let expiry = Utc
            .timestamp_opt(raw.exp, 0)
            .single()
            .ok_or_else(|| VerificationError::InvalidClaims("exp".to_string()))?;

        Ok(VerifiedClaims {
            subject,
            issuer: raw.iss,
            audience: self.audience.clone(),
            expiry,
            token_use: raw.token_use,
            key_id,
        })
    }
}

fn is_rsa_family(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512)
}

fn map_jwt_error(kind: &ErrorKind) -> VerificationError {
    match kind {
        ErrorKind::InvalidSignature => VerificationError::InvalidSignature,
        ErrorKind::ExpiredSignature => VerificationError::Expired,
        ErrorKind::ImmatureSignature => VerificationError::NotYetValid,
        ErrorKind::InvalidIssuer => VerificationError::InvalidIssuer,
        ErrorKind::InvalidAudience => VerificationError::InvalidAudience,
        ErrorKind::InvalidAlgorithm => VerificationError::InvalidSignature,
        ErrorKind::MissingRequiredClaim(claim) => VerificationError::InvalidClaims(claim.clone()),
        ErrorKind::Json(_) => VerificationError::InvalidClaims("payload".to_string()),
        _ => VerificationError::Malformed,
    }
}
