//! # PostgreSQL Persistence
//!
//! sqlx-backed implementations of the repository ports.
//!
//! Check-and-insert runs inside a transaction holding a
//! transaction-scoped advisory lock (`pg_advisory_xact_lock`), so concurrent
//! workers cannot both miss the lookup and insert a duplicate even though
//! the key indexes are not unique. Updates use
//! `UPDATE ... WHERE version = $expected` for optimistic locking.

pub mod rfq_repository;
pub mod send_attempt_repository;
pub mod timeline_event_store;

pub use rfq_repository::PostgresRfqRepository;
pub use send_attempt_repository::PostgresSendAttemptRepository;
pub use timeline_event_store::PostgresTimelineEventStore;

use crate::config::DatabaseConfig;
use crate::infrastructure::persistence::traits::{RepositoryError, RepositoryResult};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Opens a connection pool.
///
/// # Errors
///
/// Returns `RepositoryError::Connection` if no URL is configured or the
/// database is unreachable.
pub async fn connect(config: &DatabaseConfig) -> RepositoryResult<PgPool> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| RepositoryError::connection("database.url is not configured"))?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .map_err(|e| RepositoryError::connection(e.to_string()))
}

/// Applies the bundled migrations.
///
/// # Errors
///
/// Returns `RepositoryError::Query` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> RepositoryResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| RepositoryError::query(e.to_string()))
}

/// Takes a transaction-scoped advisory lock on `scope`.
pub(crate) async fn advisory_lock(
    conn: &mut sqlx::PgConnection,
    scope: &str,
) -> RepositoryResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(scope)
        .execute(conn)
        .await
        .map_err(|e| RepositoryError::query(e.to_string()))?;
    Ok(())
}

pub(crate) fn to_db_version(version: u64) -> RepositoryResult<i64> {
    i64::try_from(version).map_err(|_| RepositoryError::internal("version overflow"))
}

pub(crate) fn from_db_version(version: i64) -> RepositoryResult<u64> {
    u64::try_from(version).map_err(|_| RepositoryError::serialization("negative version"))
}

pub(crate) fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::query(e.to_string())
}
