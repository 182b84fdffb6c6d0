//! SQLite-backed transfer store
//!
//! # Storage
//! One row per transfer. The full record is kept as JSON in `body`; id,
//! direction and status are duplicated into columns for ad-hoc queries.

use super::{check_overwrite, TransferStore};
use crate::error::{BridgeError, Result};
use crate::types::PendingTransfer;
use async_trait::async_trait;
use ethers::types::H256;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS transfers (
    id TEXT PRIMARY KEY,
    direction TEXT NOT NULL,
    status TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

const UPSERT: &str = "INSERT INTO transfers (id, direction, status, body, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(id) DO UPDATE SET
        status = excluded.status,
        body = excluded.body,
        updated_at = excluded.updated_at";

pub struct SqliteTransferStore {
    pool: SqlitePool,
}

fn id_key(id: H256) -> String {
    format!("{:?}", id)
}

impl SqliteTransferStore {
    /// Connect and create the schema if needed
    ///
    /// # Arguments
    /// * `url` - e.g. "sqlite://relayer.db" or "sqlite::memory:"
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // every connection to :memory: is its own database
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        info!("Transfer store ready at {}", url);
        Ok(Self { pool })
    }

    fn decode(body: &str) -> Result<PendingTransfer> {
        serde_json::from_str(body).map_err(|e| BridgeError::Store(format!("corrupt transfer row: {}", e)))
    }
}

#[async_trait]
impl TransferStore for SqliteTransferStore {
    async fn save(&self, transfer: &PendingTransfer) -> Result<()> {
        let body = serde_json::to_string(transfer)?;
        let mut tx = self.pool.begin().await?;
        let stored = sqlx::query("SELECT body FROM transfers WHERE id = ?1")
            .bind(id_key(transfer.id))
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| Self::decode(&row.try_get::<String, _>("body")?))
            .transpose()?;
        check_overwrite(stored.as_ref(), transfer)?;
        sqlx::query(UPSERT)
            .bind(id_key(transfer.id))
            .bind(transfer.direction.as_str())
            .bind(transfer.status.as_str())
            .bind(body)
            .bind(transfer.updated_at as i64)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, id: H256) -> Result<Option<PendingTransfer>> {
        let row = sqlx::query("SELECT body FROM transfers WHERE id = ?1")
            .bind(id_key(id))
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::decode(&row.try_get::<String, _>("body")?)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<PendingTransfer>> {
        let rows = sqlx::query("SELECT body FROM transfers ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Self::decode(&row.try_get::<String, _>("body")?))
            .collect()
    }
}
