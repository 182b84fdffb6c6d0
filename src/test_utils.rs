//! Fixtures and an in-memory chain for unit tests.

use crate::chain::ChainClient;
use crate::codec::{initiation_topic, MESSAGE_VERSION};
use crate::error::{BridgeError, Result};
use crate::l1::{
    append_tx_batch_selector, assertion_confirmed_topic, assertion_created_topic,
    tx_batch_appended_topic,
};
use crate::types::{CrossDomainMessage, Direction, StorageProof, TxPayload, TxReceipt};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, Filter, Log, H256, U256, U64};
use ethers::utils::keccak256;
use futures::channel::mpsc::UnboundedSender;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn sample_message(nonce: U256, value: U256) -> CrossDomainMessage {
    CrossDomainMessage {
        version: U256::from(MESSAGE_VERSION),
        nonce,
        sender: Address::repeat_byte(0x11),
        target: Address::repeat_byte(0x22),
        value,
        gas_limit: U256::from(200_000),
        data: Bytes::new(),
    }
}

pub fn sample_proof() -> StorageProof {
    StorageProof {
        account_proof: vec![
            Bytes::from(vec![0xf9, 0x02, 0x11, 0xa0]),
            Bytes::from(vec![0xf8, 0x51, 0x80]),
        ],
        storage_proof: vec![Bytes::from(vec![0xe2, 0xa0, 0x01])],
    }
}

fn uint_topic(value: U256) -> H256 {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    H256::from(word)
}

fn positioned(address: Address, topics: Vec<H256>, data: Vec<u8>, block: u64, log_index: u64) -> Log {
    Log {
        address,
        topics,
        data: data.into(),
        block_number: Some(U64::from(block)),
        log_index: Some(U256::from(log_index)),
        transaction_hash: Some(H256::from_low_u64_be(block)),
        ..Default::default()
    }
}

/// The event a portal emits when `message` is initiated
pub fn initiation_log(
    direction: Direction,
    portal: Address,
    message: &CrossDomainMessage,
    block: u64,
) -> Log {
    let data = ethers::abi::encode(&[
        Token::Uint(message.value),
        Token::Uint(message.gas_limit),
        Token::Bytes(message.data.to_vec()),
        Token::FixedBytes(message.hash().as_bytes().to_vec()),
    ]);
    positioned(
        portal,
        vec![
            initiation_topic(direction),
            uint_topic(message.nonce),
            H256::from(message.sender),
            H256::from(message.target),
        ],
        data,
        block,
        1,
    )
}

/// `appendTxBatch` calldata with `context_words` context entries
pub fn append_tx_batch_calldata(first_block: u64, context_words: usize) -> Vec<u8> {
    let contexts = vec![Token::Uint(U256::one()); context_words];
    let tx_lengths = vec![Token::Uint(U256::from(100)); context_words / 2];
    let mut calldata = append_tx_batch_selector().to_vec();
    calldata.extend(ethers::abi::encode(&[
        Token::Array(contexts),
        Token::Array(tx_lengths),
        Token::Uint(U256::from(first_block)),
        Token::Bytes(vec![0xc0]),
    ]));
    calldata
}

pub fn batch_appended_log(inbox: Address, block: u64, log_index: u64, tx_hash: H256) -> Log {
    let mut log = positioned(
        inbox,
        vec![tx_batch_appended_topic(), uint_topic(U256::from(block))],
        ethers::abi::encode(&[Token::Uint(U256::zero()), Token::Uint(U256::zero())]),
        block,
        log_index,
    );
    log.transaction_hash = Some(tx_hash);
    log
}

pub fn assertion_created_log(rollup: Address, block: u64, log_index: u64, id: u64) -> Log {
    let data = ethers::abi::encode(&[
        Token::Uint(U256::from(id)),
        Token::Address(Address::repeat_byte(0xa5)),
        Token::FixedBytes(vec![0u8; 32]),
        Token::Uint(U256::zero()),
    ]);
    positioned(rollup, vec![assertion_created_topic()], data, block, log_index)
}

pub fn assertion_confirmed_log(rollup: Address, block: u64, log_index: u64, id: u64) -> Log {
    let data = ethers::abi::encode(&[Token::Uint(U256::from(id))]);
    positioned(rollup, vec![assertion_confirmed_topic()], data, block, log_index)
}

/// What the mock does with the next submitted transaction
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Accepted and mined right away
    Mined {
        block_number: u64,
        success: bool,
        logs: Vec<Log>,
    },
    /// Accepted; the receipt shows up once the test calls `mine`
    Pending,
    /// Refused by the node
    Rejected(BridgeError),
}

#[derive(Default)]
struct MockState {
    submitted: Vec<(H256, TxPayload)>,
    outcomes: VecDeque<SubmitOutcome>,
    receipts: HashMap<H256, TxReceipt>,
    logs: Vec<Log>,
    subscribers: Vec<UnboundedSender<Log>>,
    proof_results: VecDeque<Result<StorageProof>>,
    proof_requests: Vec<(Address, H256, u64)>,
    inputs: HashMap<H256, Bytes>,
    revert_reason: Option<String>,
    block_number: u64,
    block_number_calls: usize,
    block_number_gate: Option<Arc<Semaphore>>,
    subscriptions: usize,
}

/// Scriptable `ChainClient` with deterministic transaction hashes
pub struct MockChainClient {
    name: String,
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Hash the next submission will get
    pub fn next_tx_hash(&self) -> H256 {
        let n = self.state().submitted.len();
        H256::from(keccak256(format!("{}-tx-{}", self.name, n).as_bytes()))
    }

    pub fn push_submit_outcome(&self, outcome: SubmitOutcome) {
        self.state().outcomes.push_back(outcome);
    }

    pub fn submitted(&self) -> Vec<(H256, TxPayload)> {
        self.state().submitted.clone()
    }

    pub fn mine(&self, tx_hash: H256, block_number: u64, success: bool, logs: Vec<Log>) {
        self.state().receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number,
                success,
                logs,
            },
        );
    }

    pub fn push_proof_result(&self, result: Result<StorageProof>) {
        self.state().proof_results.push_back(result);
    }

    pub fn proof_requests(&self) -> Vec<(Address, H256, u64)> {
        self.state().proof_requests.clone()
    }

    pub fn set_transaction_input(&self, tx_hash: H256, input: Vec<u8>) {
        self.state().inputs.insert(tx_hash, input.into());
    }

    pub fn set_revert_reason(&self, reason: &str) {
        self.state().revert_reason = Some(reason.to_string());
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.state().block_number = block_number;
    }

    /// Log visible to `get_logs` only
    pub fn push_log(&self, log: Log) {
        self.state().logs.push(log);
    }

    /// Log visible to `get_logs` and delivered to live subscribers
    pub fn emit(&self, log: Log) {
        let mut state = self.state();
        state.logs.push(log.clone());
        state
            .subscribers
            .retain(|tx| tx.unbounded_send(log.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Number of `subscribe` calls so far
    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions
    }

    /// End every live subscription stream
    pub fn close_subscriptions(&self) {
        self.state().subscribers.clear();
    }

    /// Hold every later `block_number` call until a permit is added to the
    /// returned semaphore
    pub fn gate_block_number(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state().block_number_gate = Some(gate.clone());
        gate
    }

    pub fn block_number_calls(&self) -> usize {
        self.state().block_number_calls
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_transaction(&self, payload: TxPayload) -> Result<H256> {
        let tx_hash = self.next_tx_hash();
        let mut state = self.state();
        let outcome = state.outcomes.pop_front().unwrap_or(SubmitOutcome::Mined {
            block_number: state.block_number,
            success: true,
            logs: Vec::new(),
        });
        match outcome {
            SubmitOutcome::Rejected(e) => return Err(e),
            SubmitOutcome::Pending => {}
            SubmitOutcome::Mined {
                block_number,
                success,
                logs,
            } => {
                state.receipts.insert(
                    tx_hash,
                    TxReceipt {
                        tx_hash,
                        block_number,
                        success,
                        logs,
                    },
                );
            }
        }
        state.submitted.push((tx_hash, payload));
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt> {
        loop {
            let receipt = self.state().receipts.get(&tx_hash).cloned();
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>> {
        Ok(self.state().logs.clone())
    }

    async fn subscribe(&self, _filter: Filter) -> Result<BoxStream<'static, Log>> {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let mut state = self.state();
        state.subscriptions += 1;
        state.subscribers.push(tx);
        Ok(rx.boxed())
    }

    async fn get_storage_proof(
        &self,
        address: Address,
        key: H256,
        block: u64,
    ) -> Result<StorageProof> {
        let mut state = self.state();
        state.proof_requests.push((address, key, block));
        state.proof_results.pop_front().unwrap_or_else(|| Ok(sample_proof()))
    }

    async fn get_transaction_input(&self, tx_hash: H256) -> Result<Bytes> {
        self.state()
            .inputs
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| BridgeError::ChainRpc(format!("transaction {:?} not found", tx_hash)))
    }

    async fn revert_reason(&self, _tx_hash: H256) -> Result<Option<String>> {
        Ok(self.state().revert_reason.clone())
    }

    async fn block_number(&self) -> Result<u64> {
        let gate = {
            let mut state = self.state();
            state.block_number_calls += 1;
            state.block_number_gate.clone()
        };
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| BridgeError::ChainRpc(e.to_string()))?;
        }
        Ok(self.state().block_number)
    }
}
