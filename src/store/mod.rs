//! Transfer Store Module
//!
//! Durable record of every transfer the relayer owns. The state machine saves
//! after each transition; on restart the orchestrator lists what is left and
//! resumes it.
//!
//! # Backends
//! - `MemoryTransferStore`: process-local, used when no database is configured
//! - `SqliteTransferStore`: one row per transfer in a SQLite database

mod memory;
mod sqlite;

pub use memory::MemoryTransferStore;
pub use sqlite::SqliteTransferStore;

use crate::error::{BridgeError, Result};
use crate::types::PendingTransfer;
use async_trait::async_trait;
use ethers::types::H256;
use std::sync::Arc;

#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert or overwrite the transfer with the same id
    ///
    /// Refuses a write that would move the stored status backwards.
    async fn save(&self, transfer: &PendingTransfer) -> Result<()>;

    async fn load(&self, id: H256) -> Result<Option<PendingTransfer>>;

    /// All known transfers, oldest first
    async fn list(&self) -> Result<Vec<PendingTransfer>>;
}

/// Reject `next` if it would replace `stored` with an earlier status
fn check_overwrite(stored: Option<&PendingTransfer>, next: &PendingTransfer) -> Result<()> {
    match stored {
        Some(stored) if !stored.status.may_be_replaced_by(next.status) => Err(BridgeError::Store(format!(
            "stale write for {:?}: stored {} cannot become {}",
            next.id,
            stored.status.as_str(),
            next.status.as_str()
        ))),
        _ => Ok(()),
    }
}

/// Open the store described by a database URL; empty means in-memory
pub async fn open_store(url: &str) -> Result<Arc<dyn TransferStore>> {
    if url.is_empty() {
        return Ok(Arc::new(MemoryTransferStore::new()));
    }
    Ok(Arc::new(SqliteTransferStore::connect(url).await?))
}
