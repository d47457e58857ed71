use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use todo_api::app::{self, AppState};
use todo_api::auth::KeySetCache;
use todo_api::config::AppConfig;
use todo_api::database::{DatabaseManager, PgTodoRepository, PgUserRepository, UserStoreResolver};
use todo_api::middleware::{AuthConfig, Authenticator};
use todo_api::services::TodoService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so local runs pick up DB_* and COGNITO_* settings
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    // RUST_LOG wins over LOG_LEVEL when both are set
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_directive())))
        .init();

    let port = config.port()?;
    info!(
        environment = config.environment.as_str(),
        port,
        dev_mode = config.auth.dev_mode,
        "Starting todo API"
    );

    let db = DatabaseManager::connect_lazy(&config.database).context("failed to configure database pool")?;
    let authenticator = build_authenticator(&config, &db)?;
    let state = AppState::new(TodoService::new(Arc::new(PgTodoRepository::new(db.pool().clone()))));

    let app = app::router(state, Arc::new(authenticator));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    info!("Server stopped");
    Ok(())
}

fn build_authenticator(config: &AppConfig, db: &DatabaseManager) -> anyhow::Result<Authenticator> {
    if config.auth.dev_mode {
        warn!("AUTH_DEV_MODE enabled: caller identity is taken from the X-User-ID header");
        return Ok(Authenticator::new(AuthConfig {
            dev_mode: true,
            ..Default::default()
        })?);
    }

    let keys = KeySetCache::with_settings(
        config.cognito.jwks_url(),
        config.jwks_refresh_cooldown(),
        config.jwks_fetch_timeout(),
    )
    .context("failed to build key-set client")?;
    info!(jwks_url = keys.url(), issuer = %config.cognito.issuer(), "Verifying bearer tokens");
    let users = Arc::new(PgUserRepository::new(db.pool().clone()));

    Ok(Authenticator::new(AuthConfig {
        dev_mode: false,
        key_set: Some(Arc::new(keys)),
        issuer: config.cognito.issuer(),
        audience: config.cognito.app_client_id.clone(),
        algorithms: config.signing_algorithms()?,
        token_use: config.auth.token_use.clone(),
        resolver: Some(Arc::new(UserStoreResolver::new(users))),
    })?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
