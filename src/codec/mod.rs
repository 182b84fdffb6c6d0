//! Message Codec Module
//!
//! Pure, deterministic translation between bridge requests and chain data:
//! - Calls: bridge entry point and portal finalize calldata
//! - Messages: initiation event logs into `CrossDomainMessage`

mod calls;
mod message;

pub use calls::{
    encode_bridge_call, encode_finalize_deposit, encode_finalize_withdrawal,
    finalize_deposit_params, finalize_withdrawal_params, TransferRequest,
};
pub use message::{
    decode_initiation_log, find_initiation_message, initiation_topic, MESSAGE_VERSION,
};
