pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("invalid database url: {0}")]
    Config(String),
    #[error("sql error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pool plus schema bootstrap. The SQLite file is the single
/// source of truth; no state is cached outside it.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn from_env() -> Result<Self, DbInitError> {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:examina.db?mode=rwc".to_string());
        Self::from_url(&url).await
    }

    pub async fn from_url(url: &str) -> Result<Self, DbInitError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|err| DbInitError::Config(err.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database, mainly for tests. A single connection
    /// keeps the whole pool on the same database instance.
    pub async fn in_memory() -> Result<Self, DbInitError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|err| DbInitError::Config(err.to_string()))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
