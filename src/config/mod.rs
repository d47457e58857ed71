use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub auth: AuthSettings,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub cognito: CognitoConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    Alpha,
    Beta,
    Prod,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Environment::Local),
            "alpha" => Some(Environment::Alpha),
            "beta" => Some(Environment::Beta),
            "prod" => Some(Environment::Prod),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Alpha => "alpha",
            Environment::Beta => "beta",
            Environment::Prod => "prod",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Raw value so that validation can report what was actually supplied
    pub port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    pub dev_mode: bool,
    pub jwks_refresh_cooldown_secs: u64,
    pub jwks_fetch_timeout_secs: u64,
    /// Comma separated, e.g. `RS256,RS512`
    pub algorithms: String,
    pub token_use: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitoConfig {
    pub region: String,
    pub user_pool_id: String,
    pub app_client_id: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid SERVER_PORT {0:?}")]
    InvalidPort(String),

    #[error("invalid APP_ENV {0:?}: must be one of local, alpha, beta, prod")]
    InvalidEnvironment(String),

    #[error("AUTH_DEV_MODE must not be enabled in {0} environment")]
    DevModeOutsideLocal(String),

    #[error("{0} is required when AUTH_DEV_MODE is disabled")]
    MissingSetting(&'static str),

    #[error("unsupported signing algorithm {0:?}: allowed are RS256, RS384, RS512")]
    InvalidAlgorithm(String),

    #[error("invalid {0} {1:?}: expected a non-negative integer")]
    InvalidNumber(&'static str, String),

    #[error("invalid database url: {0}")]
    InvalidDatabaseUrl(#[from] url::ParseError),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset, matching how the deployment tooling exports blanks.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let env_name = or_default("APP_ENV", "local");
        let environment =
            Environment::parse(&env_name).ok_or_else(|| ConfigError::InvalidEnvironment(env_name.clone()))?;

        let mut config = Self::defaults(environment);

        config.server.port = or_default("SERVER_PORT", &config.server.port);
        config.log_level = or_default("LOG_LEVEL", &config.log_level);

        if let Some(v) = get("AUTH_DEV_MODE") {
            config.auth.dev_mode = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("JWKS_REFRESH_COOLDOWN_SECS") {
            config.auth.jwks_refresh_cooldown_secs = parse_number("JWKS_REFRESH_COOLDOWN_SECS", v)?;
        }
        if let Some(v) = get("JWKS_FETCH_TIMEOUT_SECS") {
            config.auth.jwks_fetch_timeout_secs = parse_number("JWKS_FETCH_TIMEOUT_SECS", v)?;
        }
        config.auth.algorithms = or_default("AUTH_ALGORITHMS", &config.auth.algorithms);
        config.auth.token_use = get("AUTH_TOKEN_USE");

        // Database overrides
        config.database.host = or_default("DB_HOST", &config.database.host);
        config.database.port = or_default("DB_PORT", &config.database.port);
        config.database.user = or_default("DB_USER", &config.database.user);
        config.database.password = or_default("DB_PASSWORD", &config.database.password);
        config.database.name = or_default("DB_NAME", &config.database.name);
        config.database.ssl_mode = or_default("DB_SSLMODE", &config.database.ssl_mode);
        if let Some(v) = get("DB_MAX_CONNECTIONS") {
            config.database.max_connections = parse_number("DB_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = get("DB_CONNECT_TIMEOUT_SECS") {
            config.database.connect_timeout_secs = parse_number("DB_CONNECT_TIMEOUT_SECS", v)?;
        }

        // Identity provider
        config.cognito.region = or_default("COGNITO_REGION", &config.cognito.region);
        config.cognito.user_pool_id = get("COGNITO_USER_POOL_ID").unwrap_or_default();
        config.cognito.app_client_id = get("COGNITO_APP_CLIENT_ID").unwrap_or_default();

        Ok(config)
    }

    fn defaults(environment: Environment) -> Self {
        // Pool size tracks expected load per environment.
        let max_connections = match environment {
            Environment::Local => 10,
            Environment::Alpha | Environment::Beta => 20,
            Environment::Prod => 50,
        };

        Self {
            environment,
            server: ServerConfig {
                port: "8080".to_string(),
            },
            auth: AuthSettings {
                dev_mode: false,
                jwks_refresh_cooldown_secs: 300,
                jwks_fetch_timeout_secs: 10,
                algorithms: "RS256".to_string(),
                token_use: None,
            },
            log_level: "info".to_string(),
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: "5432".to_string(),
                user: "todo".to_string(),
                password: "todo".to_string(),
                name: "todo".to_string(),
                ssl_mode: "disable".to_string(),
                max_connections,
                connect_timeout_secs: 5,
            },
            cognito: CognitoConfig {
                region: "ap-northeast-1".to_string(),
                user_pool_id: String::new(),
                app_client_id: String::new(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.port()?;
        self.database.port()?;
        self.signing_algorithms()?;
        if self.auth.dev_mode && self.environment != Environment::Local {
            return Err(ConfigError::DevModeOutsideLocal(self.environment.as_str().to_string()));
        }
        if !self.auth.dev_mode {
            if self.cognito.user_pool_id.is_empty() {
                return Err(ConfigError::MissingSetting("COGNITO_USER_POOL_ID"));
            }
            if self.cognito.app_client_id.is_empty() {
                return Err(ConfigError::MissingSetting("COGNITO_APP_CLIENT_ID"));
            }
        }
        Ok(())
    }

    pub fn port(&self) -> Result<u16, ConfigError> {
        self.server
            .port
            .parse()
            .map_err(|_| ConfigError::InvalidPort(self.server.port.clone()))
    }

    /// Directive handed to the tracing `EnvFilter`; unknown levels fall back to info.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.to_ascii_lowercase().as_str() {
            "debug" => "debug",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        }
    }

    /// Token algorithms the gate accepts. Only the RSA PKCS#1 family parses.
    pub fn signing_algorithms(&self) -> Result<Vec<Algorithm>, ConfigError> {
        let algorithms = self
            .auth
            .algorithms
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| match name.to_ascii_uppercase().as_str() {
                "RS256" => Ok(Algorithm::RS256),
                "RS384" => Ok(Algorithm::RS384),
                "RS512" => Ok(Algorithm::RS512),
                _ => Err(ConfigError::InvalidAlgorithm(name.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if algorithms.is_empty() {
            return Err(ConfigError::InvalidAlgorithm(self.auth.algorithms.clone()));
        }
        Ok(algorithms)
    }

    pub fn jwks_refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.auth.jwks_refresh_cooldown_secs)
    }

    pub fn jwks_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.jwks_fetch_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber(key, value))
}

impl DatabaseConfig {
    pub fn port(&self) -> Result<u16, ConfigError> {
        self.port
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("DB_PORT", self.port.clone()))
    }

    /// Postgres connection URL with credentials percent-encoded.
    pub fn dsn(&self) -> Result<String, ConfigError> {
        let port = self.port()?;
        let mut url = url::Url::parse("postgres://localhost")?;
        url.set_host(Some(&self.host))?;
        // Only fails for cannot-be-a-base URLs, which a postgres:// URL never is.
        let _ = url.set_port(Some(port));
        let _ = url.set_username(&self.user);
        let _ = url.set_password(Some(&self.password));
        url.set_path(&self.name);
        url.query_pairs_mut().append_pair("sslmode", &self.ssl_mode);
        Ok(url.into())
    }
}

impl CognitoConfig {
    pub fn issuer(&self) -> String {
        format!("https://cognito-idp.{}.amazonaws.com/{}", self.region, self.user_pool_id)
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer())
    }
}
