use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use super::DatabaseError;
use crate::config::DatabaseConfig;

/// Owns the Postgres connection pool for the process lifetime.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Build the pool from configuration. Connections are opened lazily so
    /// the server can start while the database is still coming up; `/health`
    /// reports the store as unavailable until then.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let dsn = config.dsn().map_err(|_| DatabaseError::InvalidDatabaseUrl)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy(&dsn)?;

        info!(
            host = %config.host,
            database = %config.name,
            max_connections = config.max_connections,
            "Created database pool"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}
