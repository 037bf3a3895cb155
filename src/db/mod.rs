//! Database module for the Warden server
//!
//! This module owns the process-wide store handle (a SQLite pool opened
//! once at startup and never closed mid-process), schema migrations,
//! and the data access layer.

pub mod models;
pub mod operations;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::error::{AppError, DatabaseError};

pub use models::{Account, AccountSummary, LoginEvent, LoginOrigin, RefreshSession, Role};
pub use operations::DbOperations;

/// Open the shared store handle.
///
/// Called exactly once per process, from `AppState::new`; every
/// component borrows the resulting pool. Write-ahead journaling gives
/// concurrent reads with serialized writes, and the foreign-keys pragma
/// turns the schema's references into enforced constraints.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

    Ok(pool)
}

/// Apply the schema in `migrations/` to the connected store.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}
