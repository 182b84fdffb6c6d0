//! Transfer State Machine
//!
//! Drives one `PendingTransfer` from submission to a terminal status. Each
//! step performs the work for the current status, moves exactly one status
//! forward and persists before the next suspension point.

use crate::chain::{retry_bounded, ChainClient, RetryPolicy};
use crate::codec::{encode_finalize_deposit, encode_finalize_withdrawal, find_initiation_message};
use crate::config::ContractsConfig;
use crate::error::{BridgeError, Result};
use crate::l1::AssertionTracker;
use crate::proof::ProofGenerator;
use crate::store::TransferStore;
use crate::types::{Direction, PendingTransfer, TransferStatus, TxPayload, TxReceipt};
use ethers::types::{Address, H256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything a transfer task needs besides its own record
pub struct TransferContext {
    pub l1: Arc<dyn ChainClient>,
    pub l2: Arc<dyn ChainClient>,
    pub contracts: ContractsConfig,
    pub tracker: Arc<AssertionTracker>,
    pub store: Arc<dyn TransferStore>,
    pub proofs: ProofGenerator,
    pub rpc_retry: RetryPolicy,
    /// Re-check interval while waiting for confirmation
    pub poll_interval: Duration,
}

impl TransferContext {
    /// Chain the transfer was initiated on
    pub fn source(&self, direction: Direction) -> &Arc<dyn ChainClient> {
        match direction {
            Direction::Deposit => &self.l1,
            Direction::Withdrawal => &self.l2,
        }
    }

    /// Chain the transfer is finalized on
    pub fn destination(&self, direction: Direction) -> &Arc<dyn ChainClient> {
        match direction {
            Direction::Deposit => &self.l2,
            Direction::Withdrawal => &self.l1,
        }
    }

    pub fn source_portal(&self, direction: Direction) -> Address {
        match direction {
            Direction::Deposit => self.contracts.l1_portal,
            Direction::Withdrawal => self.contracts.l2_portal,
        }
    }

    pub fn destination_portal(&self, direction: Direction) -> Address {
        match direction {
            Direction::Deposit => self.contracts.l2_portal,
            Direction::Withdrawal => self.contracts.l1_portal,
        }
    }

    pub fn bridge(&self, direction: Direction) -> Address {
        match direction {
            Direction::Deposit => self.contracts.l1_bridge,
            Direction::Withdrawal => self.contracts.l2_bridge,
        }
    }

    pub(crate) async fn submit(&self, client: &Arc<dyn ChainClient>, payload: TxPayload) -> Result<H256> {
        retry_bounded(&self.rpc_retry, "submit transaction", BridgeError::is_transient, || {
            let client = Arc::clone(client);
            let payload = payload.clone();
            async move { client.submit_transaction(payload).await }
        })
        .await
    }

    async fn receipt(&self, client: &Arc<dyn ChainClient>, tx_hash: H256) -> Result<TxReceipt> {
        retry_bounded(&self.rpc_retry, "receipt", BridgeError::is_transient, || {
            let client = Arc::clone(client);
            async move { client.wait_for_receipt(tx_hash).await }
        })
        .await
    }

    async fn revert_reason(&self, client: &Arc<dyn ChainClient>, tx_hash: H256) -> Result<Option<String>> {
        retry_bounded(&self.rpc_retry, "revert reason", BridgeError::is_transient, || {
            let client = Arc::clone(client);
            async move { client.revert_reason(tx_hash).await }
        })
        .await
    }
}

/// Whether a finalize revert means another party already finalized the message
pub fn is_already_finalized(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("already") && reason.contains("finalized")
}

pub struct TransferMachine {
    ctx: Arc<TransferContext>,
    transfer: PendingTransfer,
}

impl TransferMachine {
    pub fn new(ctx: Arc<TransferContext>, transfer: PendingTransfer) -> Self {
        Self { ctx, transfer }
    }

    /// Run until the transfer is terminal or a transient failure outlasts its
    /// retries
    ///
    /// # Returns
    /// The last state reached, as persisted
    pub async fn drive(mut self) -> PendingTransfer {
        info!(
            "Driving {} {:?} from {}",
            self.transfer.direction.as_str(),
            self.transfer.id,
            self.transfer.status.as_str()
        );
        while !self.transfer.status.is_terminal() {
            if let Err(e) = self.step().await {
                self.handle_error(e).await;
                break;
            }
        }
        self.transfer
    }

    async fn handle_error(&mut self, e: BridgeError) {
        if e.is_transient() || matches!(e, BridgeError::Store(_)) {
            warn!(
                "Transfer {:?} suspended in {} ({}): {}",
                self.transfer.id,
                self.transfer.status.as_str(),
                e.error_type(),
                e
            );
            self.transfer.last_error = Some(e.to_string());
        } else {
            error!(
                "Transfer {:?} failed in {} ({}): {}",
                self.transfer.id,
                self.transfer.status.as_str(),
                e.error_type(),
                e
            );
            if let Err(transition) = self.transfer.fail(&e) {
                error!("Cannot fail transfer {:?}: {}", self.transfer.id, transition);
                return;
            }
        }
        if let Err(store) = self.persist().await {
            error!("Could not persist transfer {:?}: {}", self.transfer.id, store);
        }
    }

    async fn persist(&self) -> Result<()> {
        self.ctx.store.save(&self.transfer).await
    }

    async fn advance(&mut self, next: TransferStatus) -> Result<()> {
        self.transfer.transition(next)?;
        self.transfer.last_error = None;
        self.persist().await?;
        info!("Transfer {:?} -> {}", self.transfer.id, next.as_str());
        Ok(())
    }

    async fn step(&mut self) -> Result<()> {
        match self.transfer.status {
            TransferStatus::Submitted => self.await_inclusion().await,
            TransferStatus::WaitingConfirmation => self.await_confirmation().await,
            TransferStatus::ProofReady => self.submit_finalize().await,
            TransferStatus::Finalizing => self.await_finalization().await,
            TransferStatus::Finalized | TransferStatus::Failed => Ok(()),
        }
    }

    /// Submitted -> WaitingConfirmation
    async fn await_inclusion(&mut self) -> Result<()> {
        let direction = self.transfer.direction;
        let source = self.ctx.source(direction);
        let receipt = self.ctx.receipt(source, self.transfer.submit_tx_hash).await?;
        if !receipt.success {
            let reason = self
                .ctx
                .revert_reason(source, receipt.tx_hash)
                .await?
                .unwrap_or_else(|| "bridge call reverted".to_string());
            return Err(BridgeError::Reverted { reason });
        }

        let message = find_initiation_message(direction, self.ctx.source_portal(direction), &receipt.logs)?;
        debug!(
            "Transfer {:?} included at block {}, nonce {}",
            self.transfer.id, receipt.block_number, message.nonce
        );
        self.transfer.message_hash = Some(message.hash());
        self.transfer.message = Some(message);
        self.transfer.source_block_number = Some(receipt.block_number);
        self.advance(TransferStatus::WaitingConfirmation).await
    }

    /// WaitingConfirmation -> ProofReady
    async fn await_confirmation(&mut self) -> Result<()> {
        let direction = self.transfer.direction;
        let source_block = self
            .transfer
            .source_block_number
            .ok_or(BridgeError::MissingField("source block number"))?;
        let message_hash = self
            .transfer
            .message_hash
            .ok_or(BridgeError::MissingField("message hash"))?;

        let confirmation = loop {
            if let Some(confirmation) = self.ctx.tracker.confirmation_for(direction, source_block).await {
                break confirmation;
            }
            debug!(
                "Transfer {:?} waiting for an assertion covering block {}",
                self.transfer.id, source_block
            );
            tokio::time::sleep(self.ctx.poll_interval).await;
        };
        info!(
            "Transfer {:?} covered by assertion {}, proving at block {}",
            self.transfer.id, confirmation.assertion_id, confirmation.proof_block_number
        );

        let block = confirmation.proof_block_number;
        let proof = self
            .ctx
            .proofs
            .generate(
                self.ctx.source(direction),
                self.ctx.source_portal(direction),
                message_hash,
                block,
            )
            .await
            .map_err(|e| match e {
                // exhausted proof retries are final whatever the cause
                BridgeError::ChainRpc(reason) => BridgeError::ProofUnavailable { block, reason },
                other => other,
            })?;

        self.transfer.assertion_id = Some(confirmation.assertion_id);
        self.transfer.proof_block_number = Some(block);
        self.transfer.proof = Some(proof);
        self.advance(TransferStatus::ProofReady).await
    }

    fn finalize_payload(&self) -> Result<TxPayload> {
        let direction = self.transfer.direction;
        let message = self.transfer.message.as_ref().ok_or(BridgeError::MissingField("message"))?;
        let proof = self.transfer.proof.as_ref().ok_or(BridgeError::MissingField("proof"))?;
        let portal = self.ctx.destination_portal(direction);
        Ok(match direction {
            Direction::Deposit => {
                let block = self
                    .transfer
                    .proof_block_number
                    .ok_or(BridgeError::MissingField("proof block number"))?;
                encode_finalize_deposit(portal, message, block, proof)
            }
            Direction::Withdrawal => {
                let assertion_id = self
                    .transfer
                    .assertion_id
                    .ok_or(BridgeError::MissingField("assertion id"))?;
                encode_finalize_withdrawal(portal, message, assertion_id, proof)
            }
        })
    }

    /// ProofReady -> Finalizing, and straight on to a terminal status when the
    /// node rejects the call outright
    async fn submit_finalize(&mut self) -> Result<()> {
        let payload = self.finalize_payload()?;
        let destination = self.ctx.destination(self.transfer.direction);
        match self.ctx.submit(destination, payload).await {
            Ok(tx_hash) => {
                self.transfer.finalize_tx_hash = Some(tx_hash);
                info!("Transfer {:?} finalize submitted in {:?}", self.transfer.id, tx_hash);
                if self.transfer.status == TransferStatus::ProofReady {
                    self.advance(TransferStatus::Finalizing).await
                } else {
                    self.persist().await
                }
            }
            Err(BridgeError::Reverted { reason }) => {
                if self.transfer.status == TransferStatus::ProofReady {
                    self.advance(TransferStatus::Finalizing).await?;
                }
                self.classify_revert(reason).await
            }
            Err(e) => Err(e),
        }
    }

    /// Finalizing -> Finalized
    async fn await_finalization(&mut self) -> Result<()> {
        let Some(tx_hash) = self.transfer.finalize_tx_hash else {
            // rejected at submission and never classified; a retry reverts again
            return self.submit_finalize().await;
        };
        let destination = self.ctx.destination(self.transfer.direction);
        let receipt = self.ctx.receipt(destination, tx_hash).await?;
        if receipt.success {
            return self.advance(TransferStatus::Finalized).await;
        }
        let reason = self
            .ctx
            .revert_reason(destination, tx_hash)
            .await?
            .unwrap_or_else(|| "finalize reverted".to_string());
        self.classify_revert(reason).await
    }

    async fn classify_revert(&mut self, reason: String) -> Result<()> {
        if is_already_finalized(&reason) {
            info!(
                "Transfer {:?} was already finalized elsewhere: {}",
                self.transfer.id, reason
            );
            return self.advance(TransferStatus::Finalized).await;
        }
        Err(BridgeError::Reverted { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_finalized_matching() {
        assert!(is_already_finalized("execution reverted: Message already finalized"));
        assert!(is_already_finalized("ALREADY FINALIZED"));
        assert!(is_already_finalized("withdrawal has already been finalized"));
        assert!(!is_already_finalized("execution reverted: invalid proof"));
        assert!(!is_already_finalized("already relayed"));
    }
}
