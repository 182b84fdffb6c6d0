//! Assertion Tracker Module
//!
//! Correlates L1 rollup events into the answer the transfer state machine
//! needs: has the block a transfer was included in been committed by an
//! assertion that was created and later confirmed?
//!
//! # Event log
//! Every observed event is kept in an append-only log keyed by its L1 position.
//! Subscription and backfill can both deliver the same event, and backfill can
//! deliver events older than ones already seen; duplicates are dropped and an
//! out-of-order insert rebuilds the derived index from the log.

use crate::types::{BlockRange, Direction};
use ethers::types::U256;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Position of a log on L1, the total order of all tracker events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A sequencer batch landed in the inbox, already resolved to its blocks
    BatchAppended(BlockRange),
    AssertionCreated { id: U256 },
    AssertionConfirmed { id: U256 },
}

/// An assertion and the L2 blocks it commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionRecord {
    pub id: U256,
    /// `None` when no batch was appended since the previous assertion
    pub covered: Option<BlockRange>,
    pub created_at: EventPosition,
}

/// Where a transfer's proof must be anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub assertion_id: U256,
    /// Last L2 block committed by the assertion
    pub proof_block_number: u64,
}

#[derive(Debug, Default)]
struct TrackerIndex {
    last_confirmed_block_number: Option<u64>,
    assertions: Vec<AssertionRecord>,
    by_id: HashMap<U256, usize>,
    /// Confirmed assertion indexes in confirmation order
    confirmations: Vec<(EventPosition, usize)>,
}

impl TrackerIndex {
    fn apply(&mut self, position: EventPosition, event: &TrackerEvent) {
        match event {
            TrackerEvent::BatchAppended(range) => {
                self.last_confirmed_block_number = Some(
                    self.last_confirmed_block_number
                        .map_or(range.last, |head| head.max(range.last)),
                );
            }
            TrackerEvent::AssertionCreated { id } => {
                if self.by_id.contains_key(id) {
                    debug!("Ignoring duplicate AssertionCreated for {}", id);
                    return;
                }
                let previous_last = self
                    .assertions
                    .iter()
                    .rev()
                    .find_map(|a| a.covered.map(|c| c.last));
                let covered = match (previous_last, self.last_confirmed_block_number) {
                    (_, None) => None,
                    (None, Some(head)) => Some(BlockRange { first: 0, last: head }),
                    (Some(prev), Some(head)) if head > prev => Some(BlockRange {
                        first: prev + 1,
                        last: head,
                    }),
                    (Some(_), Some(_)) => None,
                };
                self.by_id.insert(*id, self.assertions.len());
                self.assertions.push(AssertionRecord {
                    id: *id,
                    covered,
                    created_at: position,
                });
            }
            TrackerEvent::AssertionConfirmed { id } => {
                let Some(&index) = self.by_id.get(id) else {
                    debug!("Ignoring confirmation of unobserved assertion {}", id);
                    return;
                };
                if self.assertions[index].created_at >= position {
                    return;
                }
                if self.confirmations.iter().any(|(_, i)| *i == index) {
                    return;
                }
                self.confirmations.push((position, index));
            }
        }
    }

    fn confirmation_for(&self, direction: Direction, source_block: u64) -> Option<Confirmation> {
        if self.last_confirmed_block_number? < source_block {
            return None;
        }
        self.confirmations.iter().find_map(|(_, index)| {
            let record = &self.assertions[*index];
            let covered = record.covered?;
            if covered.last < source_block {
                return None;
            }
            // A deposit's source block is an L1 height; the assertion must be
            // posted after the deposit landed.
            if direction == Direction::Deposit && record.created_at.block_number <= source_block {
                return None;
            }
            Some(Confirmation {
                assertion_id: record.id,
                proof_block_number: covered.last,
            })
        })
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    log: BTreeMap<EventPosition, TrackerEvent>,
    index: TrackerIndex,
}

/// Shared view of rollup assertions
///
/// One writer (the L1 listener) records events; any number of transfer tasks
/// read confirmations concurrently.
#[derive(Debug, Default)]
pub struct AssertionTracker {
    state: RwLock<TrackerState>,
}

impl AssertionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event; returns `false` if it was already known
    pub async fn record(&self, position: EventPosition, event: TrackerEvent) -> bool {
        let mut state = self.state.write().await;
        if state.log.contains_key(&position) {
            return false;
        }
        let in_order = state
            .log
            .last_key_value()
            .map_or(true, |(last, _)| *last < position);

        debug!(
            "Tracker event at {}:{}: {:?}",
            position.block_number, position.log_index, event
        );
        if in_order {
            state.index.apply(position, &event);
            state.log.insert(position, event);
        } else {
            state.log.insert(position, event);
            let mut index = TrackerIndex::default();
            for (pos, ev) in state.log.iter() {
                index.apply(*pos, ev);
            }
            state.index = index;
            info!(
                "Rebuilt assertion index after late event at block {}",
                position.block_number
            );
        }
        true
    }

    /// Highest L2 block covered by an appended batch
    pub async fn last_confirmed_block_number(&self) -> Option<u64> {
        self.state.read().await.index.last_confirmed_block_number
    }

    /// First confirmed assertion that commits to `source_block`
    pub async fn confirmation_for(
        &self,
        direction: Direction,
        source_block: u64,
    ) -> Option<Confirmation> {
        self.state
            .read()
            .await
            .index
            .confirmation_for(direction, source_block)
    }

    pub async fn assertions(&self) -> Vec<AssertionRecord> {
        self.state.read().await.index.assertions.clone()
    }
}
