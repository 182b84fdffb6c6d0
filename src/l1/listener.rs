//! Layer 1 Listener Module
//!
//! This module watches the L1 rollup contracts and feeds the assertion tracker.
//!
//! # Events Monitored
//! - **TxBatchAppended** (sequencer inbox): the batch transaction's calldata is
//!   fetched and resolved to the L2 blocks it covers
//! - **AssertionCreated** / **AssertionConfirmed** (rollup): the two phases an
//!   assertion must pass before transfers it covers can be finalized
//!
//! # Recovery
//! A subscription that fails, ends, or hits an event it cannot process is
//! dropped and re-established after a backoff. Every new subscription is
//! followed by a backfill, which replays whatever was missed in between.

use super::assertions::{AssertionTracker, EventPosition, TrackerEvent};
use super::batch_locator::locate_batch;
use crate::chain::{retry_bounded, ChainClient, RetryPolicy};
use crate::config::TrackerConfig;
use crate::error::{BridgeError, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use ethers::abi::ParamType;
use ethers::types::{Address, Filter, Log, ValueOrArray, H256, U256};
use ethers::utils::keccak256;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TX_BATCH_APPENDED: &str = "TxBatchAppended(uint256,uint256,uint256)";
const ASSERTION_CREATED: &str = "AssertionCreated(uint256,address,bytes32,uint256)";
const ASSERTION_CONFIRMED: &str = "AssertionConfirmed(uint256)";

pub fn tx_batch_appended_topic() -> H256 {
    H256::from(keccak256(TX_BATCH_APPENDED.as_bytes()))
}

pub fn assertion_created_topic() -> H256 {
    H256::from(keccak256(ASSERTION_CREATED.as_bytes()))
}

pub fn assertion_confirmed_topic() -> H256 {
    H256::from(keccak256(ASSERTION_CONFIRMED.as_bytes()))
}

/// L1 event listener
///
/// Sole writer of the assertion tracker. Runs in the background for the life
/// of the process and can be asked to backfill history at any time.
pub struct L1Listener {
    client: Arc<dyn ChainClient>,
    sequencer_inbox: Address,
    rollup: Address,
    /// L1 block to start backfilling from
    start_block: u64,
    tracker: Arc<AssertionTracker>,
    /// Calldata fetches and the resubscribe backoff
    retry: RetryPolicy,
}

impl L1Listener {
    /// Creates a new L1 listener
    ///
    /// # Arguments
    /// * `client` - L1 chain client
    /// * `config` - Contract addresses and the first block worth scanning
    /// * `tracker` - Tracker to feed
    pub fn new(
        client: Arc<dyn ChainClient>,
        config: &TrackerConfig,
        tracker: Arc<AssertionTracker>,
    ) -> Self {
        Self {
            client,
            sequencer_inbox: config.sequencer_inbox,
            rollup: config.rollup,
            start_block: config.start_block,
            tracker,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(ValueOrArray::Array(vec![self.sequencer_inbox, self.rollup]))
            .topic0(ValueOrArray::Array(vec![
                Some(tx_batch_appended_topic()),
                Some(assertion_created_topic()),
                Some(assertion_confirmed_topic()),
            ]))
    }

    /// Start listening for L1 events
    ///
    /// Runs for the life of the process, resubscribing with exponential
    /// backoff whenever a subscription fails or ends.
    pub async fn start(&self) {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();
        loop {
            match self.listen().await {
                Ok(handled) => {
                    warn!("L1 subscription ended after {} logs, resubscribing", handled);
                    backoff.reset();
                }
                Err(e) => warn!("L1 subscription dropped ({}): {}", e.error_type(), e),
            }
            let delay = backoff
                .next_backoff()
                .unwrap_or(Duration::from_millis(self.retry.max_backoff_ms));
            tokio::time::sleep(delay).await;
        }
    }

    /// One subscription from start to end
    ///
    /// Subscribes first and backfills second so no event falls between the
    /// two; the tracker drops whatever both deliver.
    ///
    /// # Returns
    /// Number of live logs handled once the stream ends, or the first error.
    /// Either way nothing is lost: the next subscription backfills again.
    async fn listen(&self) -> Result<usize> {
        let mut stream = self.client.subscribe(self.filter()).await?;
        info!("L1 listener subscribed to inbox {:?} and rollup {:?}", self.sequencer_inbox, self.rollup);

        let recorded = self.backfill().await?;
        info!("Backfill recorded {} events", recorded);

        let mut handled = 0;
        while let Some(log) = stream.next().await {
            self.handle_log(&log).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Replay history from the configured start block to the current head
    ///
    /// # Returns
    /// Number of events that were new to the tracker
    pub async fn backfill(&self) -> Result<usize> {
        let head = self.client.block_number().await?;
        if head < self.start_block {
            return Ok(0);
        }
        let filter = self.filter().from_block(self.start_block).to_block(head);
        let logs = self.client.get_logs(&filter).await?;
        debug!("Backfilling {} logs from blocks {}..={}", logs.len(), self.start_block, head);

        let mut recorded = 0;
        for log in &logs {
            if self.handle_log(log).await? {
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    /// Translate one log into a tracker event
    ///
    /// Logs that cannot be positioned or decoded are skipped; only RPC
    /// failures are returned so callers can retry.
    async fn handle_log(&self, log: &Log) -> Result<bool> {
        let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
            warn!("Skipping L1 log without position (pending?)");
            return Ok(false);
        };
        if log.removed == Some(true) {
            warn!("Skipping removed L1 log at block {}", block_number);
            return Ok(false);
        }
        let position = EventPosition::new(block_number.as_u64(), log_index.low_u64());

        let event = match self.decode(log).await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(false),
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(
                    "Skipping undecodable L1 log at {}:{}: {}",
                    position.block_number, position.log_index, e
                );
                return Ok(false);
            }
        };
        Ok(self.tracker.record(position, event).await)
    }

    async fn decode(&self, log: &Log) -> Result<Option<TrackerEvent>> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };

        if *topic0 == tx_batch_appended_topic() && log.address == self.sequencer_inbox {
            let tx_hash = log
                .transaction_hash
                .ok_or_else(|| BridgeError::MalformedEvent("batch log without tx hash".into()))?;
            let calldata = retry_bounded(&self.retry, "batch calldata", BridgeError::is_transient, || {
                let client = Arc::clone(&self.client);
                async move { client.get_transaction_input(tx_hash).await }
            })
            .await?;
            let range = locate_batch(&calldata)?;
            debug!("Batch {:?} covers L2 blocks {}..={}", tx_hash, range.first, range.last);
            return Ok(Some(TrackerEvent::BatchAppended(range)));
        }

        if *topic0 == assertion_created_topic() && log.address == self.rollup {
            let id = first_uint(
                &[
                    ParamType::Uint(256),
                    ParamType::Address,
                    ParamType::FixedBytes(32),
                    ParamType::Uint(256),
                ],
                log,
            )?;
            info!("Assertion {} created", id);
            return Ok(Some(TrackerEvent::AssertionCreated { id }));
        }

        if *topic0 == assertion_confirmed_topic() && log.address == self.rollup {
            let id = first_uint(&[ParamType::Uint(256)], log)?;
            info!("Assertion {} confirmed", id);
            return Ok(Some(TrackerEvent::AssertionConfirmed { id }));
        }

        Ok(None)
    }
}

fn first_uint(params: &[ParamType], log: &Log) -> Result<U256> {
    ethers::abi::decode(params, &log.data)
        .map_err(|e| BridgeError::MalformedEvent(e.to_string()))?
        .into_iter()
        .next()
        .and_then(|t| t.into_uint())
        .ok_or_else(|| BridgeError::MalformedEvent("missing assertion id".into()))
}
