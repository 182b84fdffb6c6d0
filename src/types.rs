use crate::error::{BridgeError, Result};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, Log, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Which way value moves across the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// L1 -> L2
    Deposit,
    /// L2 -> L1
    Withdrawal,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdrawal => "withdrawal",
        }
    }
}

/// Message carried from one layer to the other by a deposit or withdrawal
///
/// Produced from an initiation event, consumed by finalization. Its identity
/// is the hash of all fields, exactly as the portal contracts compute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossDomainMessage {
    pub version: U256,
    pub nonce: U256,
    pub sender: Address,
    pub target: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub data: Bytes,
}

impl CrossDomainMessage {
    /// ABI tokens in struct order, shared by hashing and the finalize calls
    pub fn tokens(&self) -> Vec<Token> {
        vec![
            Token::Uint(self.version),
            Token::Uint(self.nonce),
            Token::Address(self.sender),
            Token::Address(self.target),
            Token::Uint(self.value),
            Token::Uint(self.gas_limit),
            Token::Bytes(self.data.to_vec()),
        ]
    }

    /// `keccak256(abi.encode(version, nonce, sender, target, value, gasLimit, data))`
    pub fn hash(&self) -> H256 {
        H256::from(keccak256(ethers::abi::encode(&self.tokens())))
    }
}

/// Call to be signed and sent by a chain client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// The parts of a transaction receipt the bridge cares about
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub block_number: u64,
    pub success: bool,
    pub logs: Vec<Log>,
}

/// Inclusive range of L2 block numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub first: u64,
    pub last: u64,
}

impl BlockRange {
    pub fn contains(&self, block: u64) -> bool {
        self.first <= block && block <= self.last
    }
}

/// Account and storage proof for one storage slot of a portal contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    pub account_proof: Vec<Bytes>,
    pub storage_proof: Vec<Bytes>,
}

/// Where a transfer is in its lifecycle
///
/// Status only moves forward one step at a time; `Failed` can be entered from
/// any state that is not already terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Submitted,
    WaitingConfirmation,
    ProofReady,
    Finalizing,
    Finalized,
    Failed,
}

impl TransferStatus {
    fn rank(&self) -> u8 {
        match self {
            TransferStatus::Submitted => 0,
            TransferStatus::WaitingConfirmation => 1,
            TransferStatus::ProofReady => 2,
            TransferStatus::Finalizing => 3,
            TransferStatus::Finalized => 4,
            TransferStatus::Failed => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Finalized | TransferStatus::Failed)
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == TransferStatus::Failed || next.rank() == self.rank() + 1
    }

    /// Whether a stored record in this status may be replaced by one in `next`
    ///
    /// Same-status rewrites carry `last_error` updates. Terminal records never
    /// change status again.
    pub fn may_be_replaced_by(&self, next: TransferStatus) -> bool {
        if self.is_terminal() {
            return next == *self;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Submitted => "submitted",
            TransferStatus::WaitingConfirmation => "waiting_confirmation",
            TransferStatus::ProofReady => "proof_ready",
            TransferStatus::Finalizing => "finalizing",
            TransferStatus::Finalized => "finalized",
            TransferStatus::Failed => "failed",
        }
    }
}

/// One deposit or withdrawal owned by the state machine
///
/// Identified by the hash of the transaction that initiated it. Persisted after
/// every transition so a restarted process can pick it up where it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub id: H256,
    pub direction: Direction,
    pub amount: U256,
    pub submit_tx_hash: H256,
    pub message: Option<CrossDomainMessage>,
    pub message_hash: Option<H256>,
    /// Block of the source chain that included the initiation event
    pub source_block_number: Option<u64>,
    pub status: TransferStatus,
    pub proof_block_number: Option<u64>,
    pub assertion_id: Option<U256>,
    pub proof: Option<StorageProof>,
    pub finalize_tx_hash: Option<H256>,
    pub last_error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PendingTransfer {
    pub fn new(direction: Direction, amount: U256, submit_tx_hash: H256) -> Self {
        let now = chrono::Utc::now().timestamp() as u64;
        Self {
            id: submit_tx_hash,
            direction,
            amount,
            submit_tx_hash,
            message: None,
            message_hash: None,
            source_block_number: None,
            status: TransferStatus::Submitted,
            proof_block_number: None,
            assertion_id: None,
            proof: None,
            finalize_tx_hash: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting anything that breaks status monotonicity
    pub fn transition(&mut self, next: TransferStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BridgeError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = chrono::Utc::now().timestamp() as u64;
        Ok(())
    }

    /// Terminal failure carrying its cause
    pub fn fail(&mut self, error: &BridgeError) -> Result<()> {
        self.transition(TransferStatus::Failed)?;
        self.last_error = Some(error.to_string());
        Ok(())
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            id: self.id,
            direction: self.direction,
            status: self.status,
            amount: self.amount,
            value: self.message.as_ref().map(|m| m.value),
            message_hash: self.message_hash,
            source_block_number: self.source_block_number,
            proof_block_number: self.proof_block_number,
            assertion_id: self.assertion_id,
            finalize_tx_hash: self.finalize_tx_hash,
            last_error: self.last_error.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Read-only view of a transfer handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    pub id: H256,
    pub direction: Direction,
    pub status: TransferStatus,
    pub amount: U256,
    /// Value recorded in the cross-domain message, once known
    pub value: Option<U256>,
    pub message_hash: Option<H256>,
    pub source_block_number: Option<u64>,
    pub proof_block_number: Option<u64>,
    pub assertion_id: Option<U256>,
    pub finalize_tx_hash: Option<H256>,
    pub last_error: Option<String>,
    pub updated_at: u64,
}
