pub mod auth;

pub use auth::{
    auth_middleware, is_public_path, AuthConfig, AuthMode, AuthSetupError, AuthUser, Authenticator, ResolveError,
    UserResolver,
};
