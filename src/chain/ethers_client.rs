//! Ethers Chain Client
//!
//! `ChainClient` backed by an ethers `Middleware`. Receipts are polled,
//! subscriptions are built from `eth_getLogs` polling, and revert reasons are
//! recovered by replaying the failed call at its block.

use super::ChainClient;
use crate::error::{BridgeError, Result};
use crate::types::{StorageProof, TxPayload, TxReceipt};
use async_trait::async_trait;
use ethers::providers::{Middleware, MiddlewareError};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, BlockId, BlockNumber, Bytes, Filter, Log,
    TransactionRequest, H256, U64,
};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// `ChainClient` over an ethers middleware stack
///
/// The middleware must be able to sign (e.g. `SignerMiddleware`) for
/// `submit_transaction` to work; read-only calls work on a bare `Provider`.
pub struct EthersChainClient<M> {
    name: String,
    client: Arc<M>,
    poll_interval: Duration,
}

impl<M: Middleware + 'static> EthersChainClient<M> {
    pub fn new(name: impl Into<String>, client: M, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            client: Arc::new(client),
            poll_interval,
        }
    }
}

fn rpc_error<E: MiddlewareError>(e: E) -> BridgeError {
    match e.as_error_response() {
        Some(resp) if resp.message.contains("revert") => BridgeError::Reverted {
            reason: resp.message.clone(),
        },
        _ => BridgeError::ChainRpc(e.to_string()),
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainClient for EthersChainClient<M> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_transaction(&self, payload: TxPayload) -> Result<H256> {
        let tx = TransactionRequest::new()
            .to(payload.to)
            .data(payload.data)
            .value(payload.value);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(rpc_error)?;
        let tx_hash = pending.tx_hash();
        debug!("[{}] Submitted transaction {:?}", self.name, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt> {
        loop {
            match self.client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    let Some(block_number) = receipt.block_number else {
                        tokio::time::sleep(self.poll_interval).await;
                        continue;
                    };
                    return Ok(TxReceipt {
                        tx_hash,
                        block_number: block_number.as_u64(),
                        success: receipt.status == Some(U64::one()),
                        logs: receipt.logs,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("[{}] Receipt query for {:?} failed: {}", self.name, tx_hash, e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.client.get_logs(filter).await.map_err(rpc_error)
    }

    async fn subscribe(&self, filter: Filter) -> Result<BoxStream<'static, Log>> {
        // Polling keeps one code path for http and ws providers.
        let mut from = self.client.get_block_number().await.map_err(rpc_error)?.as_u64() + 1;
        let client = self.client.clone();
        let name = self.name.clone();
        let interval = self.poll_interval;
        let (tx, rx) = futures::channel::mpsc::unbounded();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if tx.is_closed() {
                    return;
                }
                let head = match client.get_block_number().await {
                    Ok(head) => head.as_u64(),
                    Err(e) => {
                        warn!("[{}] Head query failed: {}", name, e);
                        continue;
                    }
                };
                if head < from {
                    continue;
                }
                let range = filter.clone().from_block(from).to_block(head);
                match client.get_logs(&range).await {
                    Ok(logs) => {
                        for log in logs {
                            if tx.unbounded_send(log).is_err() {
                                return;
                            }
                        }
                        from = head + 1;
                    }
                    Err(e) => warn!("[{}] Log poll {}..={} failed: {}", name, from, head, e),
                }
            }
        });
        Ok(rx.boxed())
    }

    async fn get_storage_proof(
        &self,
        address: Address,
        key: H256,
        block: u64,
    ) -> Result<StorageProof> {
        let at = BlockId::Number(BlockNumber::Number(block.into()));
        let response = self
            .client
            .get_proof(address, vec![key], Some(at))
            .await
            .map_err(|e| match e.as_error_response() {
                Some(resp) => BridgeError::ProofUnavailable {
                    block,
                    reason: resp.message.clone(),
                },
                None => BridgeError::ChainRpc(e.to_string()),
            })?;
        let slot = response
            .storage_proof
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::ProofUnavailable {
                block,
                reason: "node returned no storage proof".into(),
            })?;
        Ok(StorageProof {
            account_proof: response.account_proof,
            storage_proof: slot.proof,
        })
    }

    async fn get_transaction_input(&self, tx_hash: H256) -> Result<Bytes> {
        let tx = self
            .client
            .get_transaction(tx_hash)
            .await
            .map_err(rpc_error)?
            .ok_or_else(|| BridgeError::ChainRpc(format!("transaction {:?} not found", tx_hash)))?;
        Ok(tx.input)
    }

    async fn revert_reason(&self, tx_hash: H256) -> Result<Option<String>> {
        let Some(tx) = self.client.get_transaction(tx_hash).await.map_err(rpc_error)? else {
            return Ok(None);
        };
        let Some(block) = tx.block_number else {
            return Ok(None);
        };
        let call: TypedTransaction = TransactionRequest {
            from: Some(tx.from),
            to: tx.to.map(Into::into),
            value: Some(tx.value),
            data: Some(tx.input.clone()),
            gas: Some(tx.gas),
            ..Default::default()
        }
        .into();
        match self.client.call(&call, Some(BlockId::Number(block.into()))).await {
            Ok(_) => Ok(None),
            Err(e) => match e.as_error_response() {
                Some(resp) => Ok(Some(resp.message.clone())),
                None => Err(BridgeError::ChainRpc(e.to_string())),
            },
        }
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.client.get_block_number().await.map_err(rpc_error)?.as_u64())
    }
}
