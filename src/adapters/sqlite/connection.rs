//! SQLite connection pool for the run database.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::StorageConfig;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid database URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to create database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open database: {0}")]
    Open(#[source] sqlx::Error),
}

/// Pool sizing for the run database.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 4,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&StorageConfig> for PoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_connections: config.max_connections.max(1),
            ..Default::default()
        }
    }
}

/// `sqlite:` URL for a database file path.
pub fn database_url(path: &Path) -> String {
    format!("sqlite:{}", path.display())
}

/// File path behind a `sqlite:` URL, `None` for in-memory databases.
fn database_path(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(Path::new(path))
    }
}

fn connect_options(url: &str) -> Result<SqliteConnectOptions, ConnectionError> {
    SqliteConnectOptions::from_str(url)
        .map(|options| options.foreign_keys(true))
        .map_err(|source| ConnectionError::InvalidUrl {
            url: url.to_string(),
            source,
        })
}

/// Open a file-backed pool in WAL mode, creating the file and its parent
/// directory when missing.
pub async fn create_pool(url: &str, config: &PoolConfig) -> Result<SqlitePool, ConnectionError> {
    if let Some(parent) = database_path(url).and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ConnectionError::Directory {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }

    let options = connect_options(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

/// Single-connection in-memory pool; the database lives as long as the pool.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options(MEMORY_URL)?)
        .await
        .map_err(ConnectionError::Open)
}

pub async fn verify_connection(pool: &SqlitePool) -> Result<(), ConnectionError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(ConnectionError::Open)?;
    Ok(())
}
