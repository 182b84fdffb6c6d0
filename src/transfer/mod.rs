//! Transfer Lifecycle Module
//!
//! - `TransferMachine`: drives one transfer through its statuses
//! - `TransferOrchestrator`: starts, resumes and cancels transfer tasks

mod machine;
mod orchestrator;

pub use machine::{is_already_finalized, TransferContext, TransferMachine};
pub use orchestrator::TransferOrchestrator;
