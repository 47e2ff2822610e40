//! Booking database bootstrap
//!
//! One pool per process, migrated before any service is built. `Database` is
//! what the health endpoint holds on to.

use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

/// Startup failures
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Cannot reach the booking database at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Booking schema migration failed: {0}")]
    Migrate(#[from] MigrateError),
}

/// Open the pool and bring the booking schema up to date
pub async fn connect(config: &Config) -> Result<Database, DbError> {
    let url = config.database_url_masked();

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await
        .map_err(|source| DbError::Connect {
            url: url.clone(),
            source,
        })?;

    tracing::info!(
        database = %url,
        max_connections = config.db_max_connections,
        "Database pool ready"
    );

    run_migrations(&pool).await?;
    Ok(Database { pool })
}

/// Apply the embedded migrations; already-applied ones are skipped
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    let migrator = sqlx::migrate!("./migrations");
    migrator.run(pool).await?;

    tracing::info!(known = migrator.iter().count(), "Booking schema up to date");
    Ok(())
}

/// Handle on the booking pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `connected`, or `error: ...` when a round trip fails
    pub async fn status(&self) -> String {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => "connected".to_string(),
            Err(e) => format!("error: {}", e),
        }
    }
}
