//! This crate relays value between an Ethereum L1 and an optimistic rollup L2.
//! It starts deposits and withdrawals, follows the rollup's assertions on L1,
//! fetches storage proofs and finalizes each transfer on the destination chain.

pub mod types; // Transfer records, messages and the status machine's states.
pub mod error; // Typed errors shared by every component.
pub mod codec; // Initiation event decoding and bridge/portal calldata.
pub mod chain; // Chain client trait, ethers implementation and retry helper.
pub mod l1; // Batch locator, assertion tracker and the L1 event listener.
pub mod proof; // Storage slot derivation and proof fetching.
pub mod store; // Persistence of transfer records.
pub mod transfer; // Per-transfer state machine and the orchestrator.
pub mod api; // JSON-RPC endpoint in front of the orchestrator.
pub mod config; // Defines and loads system configuration.

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use error::{BridgeError, Result};
pub use transfer::TransferOrchestrator;
