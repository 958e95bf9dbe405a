//! Dedup store: durable record of addresses already forwarded.
//!
//! Records are created once per successful publish and are never updated,
//! expired, or deleted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::sync::Arc;
use tracing::{debug, info};

use crate::types::Chain;

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Contract for the "already processed" set, keyed by (address, chain).
///
/// Addresses are passed already normalised (see [`Chain::dedup_key`]).
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn contains(&self, address: &str, chain: Chain) -> Result<bool>;

    /// Insert if absent.
    async fn insert(&self, address: &str, chain: Chain) -> Result<InsertOutcome>;

    /// Total number of processed addresses.
    async fn count(&self) -> Result<i64>;

    async fn health_check(&self) -> Result<bool>;
}

/// SQLite-backed dedup store.
pub struct SqliteDedupStore {
    pool: Pool<Sqlite>,
}

impl SqliteDedupStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &str) -> Result<Arc<Self>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .with_context(|| format!("Failed to open dedup database at {}", path))?;

        Self::create_schema(&pool).await?;
        info!("SqliteDedupStore initialized and connected to {}", path);

        Ok(Arc::new(Self { pool }))
    }

    /// Non-durable store for tests. A single connection keeps every query on
    /// the same in-memory database.
    pub async fn in_memory() -> Result<Arc<Self>> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::create_schema(&pool).await?;
        Ok(Arc::new(Self { pool }))
    }

    async fn create_schema(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_addresses (
                address TEXT NOT NULL,
                chain TEXT NOT NULL,
                processed_at INTEGER NOT NULL,
                PRIMARY KEY (address, chain)
            );
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create processed_addresses table")?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn contains(&self, address: &str, chain: Chain) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM processed_addresses WHERE address = ? AND chain = ? LIMIT 1",
        )
        .bind(address)
        .bind(chain.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query processed_addresses")?;

        Ok(found.is_some())
    }

    async fn insert(&self, address: &str, chain: Chain) -> Result<InsertOutcome> {
        debug!("Marking {} {} as processed", chain, address);

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO processed_addresses (address, chain, processed_at)
            VALUES (?, ?, ?);
            "#,
        )
        .bind(address)
        .bind(chain.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert into processed_addresses")?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_addresses")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count processed addresses")?;
        Ok(count)
    }

    async fn health_check(&self) -> Result<bool> {
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Dedup store health check failed")?;
        Ok(one == 1)
    }
}
