//! Database connection module for SQLite.
//!
//! Provides configuration loaded from environment variables and a pool
//! wrapper with the pragmas the metric store relies on (foreign keys for
//! cascading deletes, WAL for readers during exports).

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading database configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Database configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// How long a connection waits for a write lock.
    pub busy_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tallyspan.db"),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TALLYSPAN_DB_PATH`: Database file (default: "tallyspan.db")
    /// - `TALLYSPAN_DB_MAX_CONNECTIONS`: Pool size (default: 4)
    /// - `TALLYSPAN_DB_BUSY_TIMEOUT_SECS`: Lock wait in seconds (default: 5)
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let path = std::env::var("TALLYSPAN_DB_PATH").map_or(defaults.path, PathBuf::from);
        let max_connections = parse_env("TALLYSPAN_DB_MAX_CONNECTIONS")?
            .unwrap_or(defaults.max_connections);
        let busy_timeout = parse_env::<u64>("TALLYSPAN_DB_BUSY_TIMEOUT_SECS")?
            .map_or(defaults.busy_timeout, Duration::from_secs);

        Ok(Self {
            path,
            max_connections,
            busy_timeout,
        })
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }
}

fn parse_env<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}

/// Database handle wrapping a SQLite connection pool.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the pool cannot be
    /// established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        tracing::debug!(path = %config.path.display(), "Database opened");
        Ok(Self { pool })
    }

    /// Opens a private in-memory database.
    ///
    /// The pool is limited to a single connection because every SQLite
    /// in-memory connection sees its own database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tests database connectivity by executing a simple query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Closes the pool, waiting for connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_defaults() {
        let config = DatabaseConfig::default();

        assert_eq!(config.path, PathBuf::from("tallyspan.db"));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_database_config_from_env() {
        // All env access lives in this one test to avoid races between tests.
        std::env::remove_var("TALLYSPAN_DB_PATH");
        std::env::remove_var("TALLYSPAN_DB_MAX_CONNECTIONS");
        std::env::remove_var("TALLYSPAN_DB_BUSY_TIMEOUT_SECS");
        assert_eq!(
            DatabaseConfig::from_env().unwrap(),
            DatabaseConfig::default()
        );

        std::env::set_var("TALLYSPAN_DB_PATH", "/tmp/metrics.db");
        std::env::set_var("TALLYSPAN_DB_MAX_CONNECTIONS", "8");
        std::env::set_var("TALLYSPAN_DB_BUSY_TIMEOUT_SECS", "30");
        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/metrics.db"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_secs(30));

        std::env::set_var("TALLYSPAN_DB_MAX_CONNECTIONS", "many");
        let err = DatabaseConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TALLYSPAN_DB_MAX_CONNECTIONS"));

        std::env::remove_var("TALLYSPAN_DB_PATH");
        std::env::remove_var("TALLYSPAN_DB_MAX_CONNECTIONS");
        std::env::remove_var("TALLYSPAN_DB_BUSY_TIMEOUT_SECS");
    }

    #[tokio::test]
    async fn test_in_memory_ping() {
        let db = Database::in_memory().await.unwrap();
        tokio_test::assert_ok!(db.ping().await);
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let config = DatabaseConfig::default().with_path(&path);

        let db = Database::connect(&config).await.unwrap();
        db.ping().await.unwrap();
        db.close().await;

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::in_memory().await.unwrap();
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
