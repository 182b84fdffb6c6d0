//! Error Module
//!
//! Typed errors returned by every collaborator of the transfer state machine.
//! Collaborators never decide terminal outcomes; they return one of these and
//! the state machine classifies it.

use crate::types::TransferStatus;
use ethers::types::H256;
use thiserror::Error;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Calldata could not be decoded (wrong selector, truncated, bad shape)
    #[error("decode error: {0}")]
    Decode(String),

    /// An initiation event is missing expected topics or fields
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The node could not serve a storage proof at the requested height
    #[error("proof unavailable at block {block}: {reason}")]
    ProofUnavailable { block: u64, reason: String },

    /// Transport or node error, safe to retry
    #[error("chain rpc error: {0}")]
    ChainRpc(String),

    /// The transaction (or its gas estimation) reverted
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    #[error("illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: TransferStatus,
        to: TransferStatus,
    },

    /// A stage ran before an earlier stage recorded what it needs
    #[error("transfer is missing {0}")]
    MissingField(&'static str),

    #[error("unknown transfer {0:?}")]
    UnknownTransfer(H256),

    #[error("store error: {0}")]
    Store(String),
}

impl BridgeError {
    /// Errors worth retrying without touching transfer state.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::ChainRpc(_))
    }

    /// Short label for log fields.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Decode(_) => "decode",
            BridgeError::MalformedEvent(_) => "malformed_event",
            BridgeError::ProofUnavailable { .. } => "proof_unavailable",
            BridgeError::ChainRpc(_) => "chain_rpc",
            BridgeError::Reverted { .. } => "reverted",
            BridgeError::InvalidTransition { .. } => "invalid_transition",
            BridgeError::MissingField(_) => "missing_field",
            BridgeError::UnknownTransfer(_) => "unknown_transfer",
            BridgeError::Store(_) => "store",
        }
    }
}

impl From<ethers::abi::Error> for BridgeError {
    fn from(e: ethers::abi::Error) -> Self {
        BridgeError::Decode(e.to_string())
    }
}

impl From<sqlx::Error> for BridgeError {
    fn from(e: sqlx::Error) -> Self {
        BridgeError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rpc_errors_are_transient() {
        assert!(BridgeError::ChainRpc("timeout".into()).is_transient());
        assert!(!BridgeError::Decode("short".into()).is_transient());
        assert!(
            !BridgeError::ProofUnavailable {
                block: 1,
                reason: "missing trie node".into()
            }
            .is_transient()
        );
        assert!(!BridgeError::Reverted { reason: "x".into() }.is_transient());
    }
}
