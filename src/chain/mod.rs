//! Chain Client Module
//!
//! The bridge talks to both layers through the same narrow interface:
//! - `ChainClient`: the calls the transfer lifecycle needs from a node
//! - `EthersChainClient`: implementation over any ethers `Middleware`
//! - `retry`: bounded exponential backoff for transient failures

mod ethers_client;
pub mod retry;

pub use ethers_client::EthersChainClient;
pub use retry::{retry_bounded, RetryPolicy};

use crate::error::Result;
use crate::types::{StorageProof, TxPayload, TxReceipt};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, H256};
use futures::stream::BoxStream;

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Label used in logs ("l1", "l2")
    fn name(&self) -> &str;

    /// Sign and broadcast; returns once the node accepted the transaction
    async fn submit_transaction(&self, payload: TxPayload) -> Result<H256>;

    /// Block until the transaction is mined
    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>>;

    /// Live stream of logs matching `filter` from the current head onwards
    async fn subscribe(&self, filter: Filter) -> Result<BoxStream<'static, Log>>;

    async fn get_storage_proof(&self, address: Address, key: H256, block: u64)
        -> Result<StorageProof>;

    /// Calldata of a mined transaction
    async fn get_transaction_input(&self, tx_hash: H256) -> Result<Bytes>;

    /// Revert reason of a mined, failed transaction, recovered by replaying it
    async fn revert_reason(&self, tx_hash: H256) -> Result<Option<String>>;

    async fn block_number(&self) -> Result<u64>;
}
