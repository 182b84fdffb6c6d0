//! Transfer Orchestrator Module
//!
//! The entry point for callers. Submits the bridge call that starts a
//! transfer, persists the new record and hands it to a background task
//! running the state machine.
//!
//! # Task model
//! - One tokio task per live transfer, at most one per transfer id
//! - Tasks can be aborted at any suspension point; the persisted record is
//!   always a valid place to resume from
//! - `resume` backfills the assertion tracker before restarting a task so
//!   assertions created while nothing was listening are not missed
//! - A task is only started from the record as stored once no other task for
//!   the same id is live; starts are serialized by `spawn_lock`

use super::machine::{TransferContext, TransferMachine};
use crate::codec::{encode_bridge_call, TransferRequest};
use crate::error::{BridgeError, Result};
use crate::l1::L1Listener;
use crate::types::{Direction, PendingTransfer, TransferSnapshot};
use ethers::types::{Bytes, H256, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct TransferOrchestrator {
    ctx: Arc<TransferContext>,
    listener: Arc<L1Listener>,
    /// Gas the destination call of every bridge request gets
    min_gas_limit: u32,
    tasks: Mutex<HashMap<H256, JoinHandle<()>>>,
    spawn_lock: AsyncMutex<()>,
}

impl TransferOrchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    /// * `ctx` - Clients, contracts, tracker and store shared by all transfers
    /// * `listener` - L1 listener used to backfill the tracker on resume
    /// * `min_gas_limit` - Gas forwarded with each `bridgeETH` call
    pub fn new(ctx: Arc<TransferContext>, listener: Arc<L1Listener>, min_gas_limit: u32) -> Self {
        Self {
            ctx,
            listener,
            min_gas_limit,
            tasks: Mutex::new(HashMap::new()),
            spawn_lock: AsyncMutex::new(()),
        }
    }

    /// Bridge `amount` wei from L1 to L2
    ///
    /// # Returns
    /// The transfer id, which is the hash of the L1 bridge transaction
    pub async fn start_deposit(&self, amount: U256) -> Result<H256> {
        self.start(Direction::Deposit, amount).await
    }

    /// Bridge `amount` wei from L2 to L1
    pub async fn start_withdrawal(&self, amount: U256) -> Result<H256> {
        self.start(Direction::Withdrawal, amount).await
    }

    async fn start(&self, direction: Direction, amount: U256) -> Result<H256> {
        let request = TransferRequest {
            direction,
            amount,
            min_gas_limit: self.min_gas_limit,
            extra_data: Bytes::new(),
        };
        let payload = encode_bridge_call(self.ctx.bridge(direction), &request);
        let tx_hash = self.ctx.submit(self.ctx.source(direction), payload).await?;

        let transfer = PendingTransfer::new(direction, amount, tx_hash);
        let _spawning = self.spawn_lock.lock().await;
        self.ctx.store.save(&transfer).await?;
        info!(
            "Started {} of {} wei as {:?}",
            direction.as_str(),
            amount,
            transfer.id
        );
        self.spawn(transfer);
        Ok(tx_hash)
    }

    pub async fn get_status(&self, id: H256) -> Result<TransferSnapshot> {
        self.ctx
            .store
            .load(id)
            .await?
            .map(|t| t.snapshot())
            .ok_or(BridgeError::UnknownTransfer(id))
    }

    /// Continue a transfer from its persisted state
    ///
    /// No-op for terminal transfers and for transfers whose task is still
    /// running.
    pub async fn resume(&self, id: H256) -> Result<TransferSnapshot> {
        let transfer = self
            .ctx
            .store
            .load(id)
            .await?
            .ok_or(BridgeError::UnknownTransfer(id))?;
        if transfer.status.is_terminal() {
            debug!("Transfer {:?} already {}", id, transfer.status.as_str());
            return Ok(transfer.snapshot());
        }
        self.backfill().await;
        self.spawn_latest(id).await
    }

    /// Resume every non-terminal transfer in the store
    ///
    /// # Returns
    /// Number of transfers still unfinished after the backfill
    pub async fn resume_all(&self) -> Result<usize> {
        let pending: Vec<_> = self
            .ctx
            .store
            .list()
            .await?
            .into_iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }
        self.backfill().await;
        let mut count = 0;
        for id in pending {
            if !self.spawn_latest(id).await?.status.is_terminal() {
                count += 1;
            }
        }
        info!("Resumed {} pending transfers", count);
        Ok(count)
    }

    /// Stop driving a transfer; it stays resumable from its last saved state
    ///
    /// # Returns
    /// `true` if a running task was aborted
    pub fn cancel(&self, id: H256) -> bool {
        let handle = self.lock_tasks().remove(&id);
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("Cancelled transfer {:?}", id);
                true
            }
            _ => false,
        }
    }

    /// Whether a task is currently driving `id`
    pub fn is_running(&self, id: H256) -> bool {
        self.lock_tasks().get(&id).is_some_and(|h| !h.is_finished())
    }

    async fn backfill(&self) {
        match self.listener.backfill().await {
            Ok(recorded) => debug!("Backfill recorded {} new L1 events", recorded),
            Err(e) => warn!("Tracker backfill failed, continuing with what is known: {}", e),
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<H256, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a task from the stored record unless one is already live
    ///
    /// The record is read only after the previous task for `id` is known to
    /// have ended, so its last save is visible.
    async fn spawn_latest(&self, id: H256) -> Result<TransferSnapshot> {
        let _spawning = self.spawn_lock.lock().await;
        let running = self.is_running(id);
        let transfer = self
            .ctx
            .store
            .load(id)
            .await?
            .ok_or(BridgeError::UnknownTransfer(id))?;
        let snapshot = transfer.snapshot();
        if running {
            debug!("Transfer {:?} already has a running task", id);
        } else if transfer.status.is_terminal() {
            debug!("Transfer {:?} finished as {}", id, transfer.status.as_str());
        } else {
            self.spawn(transfer);
        }
        Ok(snapshot)
    }

    fn spawn(&self, transfer: PendingTransfer) {
        let id = transfer.id;
        let mut tasks = self.lock_tasks();
        if tasks.get(&id).is_some_and(|h| !h.is_finished()) {
            debug!("Transfer {:?} already has a running task", id);
            return;
        }
        let machine = TransferMachine::new(self.ctx.clone(), transfer);
        let handle = tokio::spawn(async move {
            let last = machine.drive().await;
            debug!("Task for {:?} ended in {}", last.id, last.status.as_str());
        });
        tasks.insert(id, handle);
    }
}
