//! SQLite persistence for client-side state.

pub mod connection;
pub mod durable_store;
pub mod migrations;

pub use connection::{create_pool, create_test_pool, database_url, verify_connection, ConnectionError, PoolConfig};
pub use durable_store::SqliteDurableStore;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};

use sqlx::SqlitePool;
use tracing::debug;

use crate::domain::models::DatabaseConfig;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Open the state database at the configured path and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let url = database_url(&config.path);
    let pool = create_pool(&url, Some(PoolConfig::from(config))).await?;
    let applied = Migrator::new(pool.clone()).run(&all_embedded_migrations()).await?;
    debug!(url = %url, applied, "state database ready");
    Ok(pool)
}

pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    Migrator::new(pool.clone()).run(&all_embedded_migrations()).await?;
    Ok(pool)
}
