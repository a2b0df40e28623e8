//! Postgres-backed `Store`/`JobRegistry` and filesystem-backed `Vault` for
//! the scheduling & accountability core.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod fs_vault;
pub mod pg_job_registry;
pub mod pg_retention;
pub mod pg_store;

pub use error::StorageError;
pub use fs_vault::FsVault;
pub use pg_job_registry::PgJobRegistry;
pub use pg_retention::PgRetentionStore;
pub use pg_store::PgStore;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
