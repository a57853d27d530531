//! SQLite persistence for optimization runs.

pub mod connection;
pub mod migrations;
pub mod state_store;

pub use connection::{
    create_pool, create_test_pool, database_url, verify_connection, ConnectionError, PoolConfig,
};
pub use migrations::{Migration, MigrationError, Migrator, EMBEDDED_MIGRATIONS};
pub use state_store::SqliteStateStore;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a `YYYY-MM-DD` date from a SQLite row field.
pub fn parse_date(s: &str) -> DomainResult<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| DomainError::SerializationError(format!("Invalid date '{s}': {e}")))
}

/// Narrow a SQLite INTEGER column to a counter.
pub fn parse_count(column: &str, value: i64) -> DomainResult<u32> {
    u32::try_from(value)
        .map_err(|_| DomainError::SerializationError(format!("{column} out of range: {value}")))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

impl From<DatabaseError> for DomainError {
    fn from(err: DatabaseError) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

/// Open (or create) the run database and bring its schema up to date.
pub async fn initialize_database(database_url: &str, config: &PoolConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run(EMBEDDED_MIGRATIONS).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run(EMBEDDED_MIGRATIONS).await?;
    Ok(pool)
}
