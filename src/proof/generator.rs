use crate::chain::{retry_bounded, ChainClient, RetryPolicy};
use crate::error::{BridgeError, Result};
use crate::types::StorageProof;
use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use std::sync::Arc;
use tracing::info;

/// Slot of the portal's `message hash => bool` mapping
pub const MESSAGES_SLOT: u64 = 0;

/// `keccak256(abi.encode(key, slot))`, the storage slot of `mapping[key]`
pub fn storage_key(message_hash: H256, slot: u64) -> H256 {
    let encoded = ethers::abi::encode(&[
        Token::FixedBytes(message_hash.as_bytes().to_vec()),
        Token::Uint(U256::from(slot)),
    ]);
    H256::from(keccak256(encoded))
}

/// Fetches the proof that a message was recorded by the source portal
pub struct ProofGenerator {
    retry: RetryPolicy,
}

impl ProofGenerator {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Account and storage proof of `portal`'s entry for `message_hash` at
    /// exactly `block`
    ///
    /// The proof is not verified here; the receiving contract checks it against
    /// the state root it trusts for `block`.
    pub async fn generate(
        &self,
        client: &Arc<dyn ChainClient>,
        portal: Address,
        message_hash: H256,
        block: u64,
    ) -> Result<StorageProof> {
        let key = storage_key(message_hash, MESSAGES_SLOT);
        info!(
            "[{}] Requesting proof for {:?} (slot key {:?}) at block {}",
            client.name(),
            message_hash,
            key,
            block
        );
        retry_bounded(
            &self.retry,
            "storage proof",
            |e| matches!(e, BridgeError::ProofUnavailable { .. } | BridgeError::ChainRpc(_)),
            || {
                let client = Arc::clone(client);
                async move { client.get_storage_proof(portal, key, block).await }
            },
        )
        .await
    }
}
