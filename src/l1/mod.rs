//! Layer 1 Integration Module
//!
//! This module follows the rollup on L1 and decides when a transfer is final:
//! - Resolves sequencer batches to the L2 blocks they cover
//! - Tracks assertions from creation to confirmation
//! - Binds each transfer to the first confirmed assertion that covers it

mod assertions;
mod batch_locator;
mod listener;

pub use assertions::{
    AssertionRecord, AssertionTracker, Confirmation, EventPosition, TrackerEvent,
};
pub use batch_locator::{append_tx_batch_selector, locate_batch};
pub use listener::{
    assertion_confirmed_topic, assertion_created_topic, tx_batch_appended_topic, L1Listener,
};
