//! Bearer-token verification: the signing key cache and the JWT pipeline
//! that checks tokens against it.

pub mod jwks;
pub mod token;

pub use jwks::{KeyLookup, KeySetCache, KeySetError, KeyType, SigningKey};
pub use token::{TokenVerifier, VerificationError, VerifiedClaims};
