//! Embedded schema migrations for the run database.
//!
//! Each migration runs in its own transaction together with the row that
//! records it in `schema_migrations`, so a failed migration leaves the schema
//! at the previous version.

use sqlx::{Executor, SqlitePool};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration {version} ({description}) failed: {source}")]
    Apply {
        version: i64,
        description: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to read or record schema version: {0}")]
    Bookkeeping(#[source] sqlx::Error),
}

/// One schema step compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Every migration, in version order.
pub const EMBEDDED_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "optimization runs, history, log, results and leases",
        sql: include_str!("../../../migrations/001_optimization_runs.sql"),
    },
    Migration {
        version: 2,
        description: "lease expiry",
        sql: include_str!("../../../migrations/002_lease_expiry.sql"),
    },
];

/// Brings a database up to the latest embedded schema version.
pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply every migration newer than the recorded version.
    ///
    /// Returns the versions applied by this call, oldest first.
    pub async fn run(&self, migrations: &[Migration]) -> Result<Vec<i64>, MigrationError> {
        self.pool
            .execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    description TEXT NOT NULL,
                    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
            )
            .await
            .map_err(MigrationError::Bookkeeping)?;

        let current = self.current_version().await?;
        let mut applied = Vec::new();

        for migration in migrations.iter().filter(|m| m.version > current) {
            self.apply(migration).await?;
            applied.push(migration.version);
        }

        Ok(applied)
    }

    /// Highest recorded version, 0 for a fresh database.
    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        let (version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await
                .map_err(MigrationError::Bookkeeping)?;
        Ok(version)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |source| MigrationError::Apply {
            version: migration.version,
            description: migration.description,
            source,
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;
        (&mut *tx).execute(migration.sql).await.map_err(failed)?;
        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        info!(version = migration.version, description = migration.description, "Applied schema migration");
        Ok(())
    }
}
