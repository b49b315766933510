//! Database connection and operations

pub mod error;
pub mod orm;
pub mod performers;
pub mod schema_sync;
pub mod sqlite_helpers;
pub mod users;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

pub use error::{DbError, DbResult};
pub use orm::{QueryBuilder, TableRegistry};

/// Database wrapper providing connection pool access and the table registry
/// every generic operation is checked against.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    registry: Arc<TableRegistry>,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool, registry: TableRegistry) -> Self {
        Self {
            pool,
            registry: Arc::new(registry),
        }
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str, max_connections: u32, registry: TableRegistry) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url {}", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool, registry))
    }

    /// Single-connection in-memory database, mainly for tests
    pub async fn in_memory(registry: TableRegistry) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool, registry))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Begin a transaction. Committing or rolling back is up to the caller.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Create any registered table that does not exist yet
    pub async fn sync_schema(&self) -> DbResult<schema_sync::SchemaSyncResult> {
        schema_sync::sync_registry(&self.pool, &self.registry).await
    }
}
