//! Proof Generator Module
//!
//! Derives the storage slot a portal uses to record a message hash and
//! fetches its Merkle-Patricia proof at the block the destination trusts.

mod generator;

pub use generator::{storage_key, ProofGenerator, MESSAGES_SLOT};
