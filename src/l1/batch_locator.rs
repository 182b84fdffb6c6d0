//! Batch Locator Module
//!
//! Resolves which L2 blocks a sequencer batch covers from the calldata of its
//! `appendTxBatch` transaction. The decoding must mirror the inbox contract
//! exactly: each L2 block contributes two context words (tx count and
//! timestamp), so the number of blocks is half the context length.

use crate::error::{BridgeError, Result};
use crate::types::BlockRange;
use ethers::abi::{short_signature, ParamType};

fn append_tx_batch_params() -> [ParamType; 4] {
    [
        ParamType::Array(Box::new(ParamType::Uint(256))),
        ParamType::Array(Box::new(ParamType::Uint(256))),
        ParamType::Uint(256),
        ParamType::Bytes,
    ]
}

/// Selector of `appendTxBatch(uint256[],uint256[],uint256,bytes)`
pub fn append_tx_batch_selector() -> [u8; 4] {
    short_signature("appendTxBatch", &append_tx_batch_params())
}

/// Decode the L2 block range covered by a batch submission
///
/// # Returns
/// `[firstL2BlockNumber, firstL2BlockNumber + contexts.len() / 2 - 1]`
pub fn locate_batch(calldata: &[u8]) -> Result<BlockRange> {
    if calldata.len() < 4 {
        return Err(BridgeError::Decode(format!(
            "calldata too short for a selector: {} bytes",
            calldata.len()
        )));
    }
    let (selector, args) = calldata.split_at(4);
    if selector != append_tx_batch_selector() {
        return Err(BridgeError::Decode(format!(
            "unexpected selector 0x{}",
            selector.iter().map(|b| format!("{:02x}", b)).collect::<String>()
        )));
    }

    let tokens = ethers::abi::decode(&append_tx_batch_params(), args)?;
    let contexts = tokens
        .first()
        .cloned()
        .and_then(|t| t.into_array())
        .ok_or_else(|| BridgeError::Decode("missing contexts".into()))?;
    let first_block = tokens
        .get(2)
        .cloned()
        .and_then(|t| t.into_uint())
        .ok_or_else(|| BridgeError::Decode("missing firstL2BlockNumber".into()))?;

    if contexts.is_empty() || contexts.len() % 2 != 0 {
        return Err(BridgeError::Decode(format!(
            "contexts must hold (numTxs, timestamp) pairs, got {} words",
            contexts.len()
        )));
    }
    if first_block.bits() > 64 {
        return Err(BridgeError::Decode(format!(
            "firstL2BlockNumber out of range: {}",
            first_block
        )));
    }

    let first = first_block.as_u64();
    let blocks = (contexts.len() / 2) as u64;
    let last = first
        .checked_add(blocks - 1)
        .ok_or_else(|| BridgeError::Decode("block range overflows".into()))?;
    Ok(BlockRange { first, last })
}
