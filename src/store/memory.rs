use super::{check_overwrite, TransferStore};
use crate::error::Result;
use crate::types::PendingTransfer;
use async_trait::async_trait;
use ethers::types::H256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemoryTransferStore {
    transfers: Arc<RwLock<HashMap<H256, PendingTransfer>>>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    async fn save(&self, transfer: &PendingTransfer) -> Result<()> {
        let mut transfers = self.transfers.write().await;
        check_overwrite(transfers.get(&transfer.id), transfer)?;
        transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn load(&self, id: H256) -> Result<Option<PendingTransfer>> {
        let transfers = self.transfers.read().await;
        Ok(transfers.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<PendingTransfer>> {
        let transfers = self.transfers.read().await;
        let mut all: Vec<_> = transfers.values().cloned().collect();
        all.sort_by_key(|t| (t.created_at, t.id));
        Ok(all)
    }
}
