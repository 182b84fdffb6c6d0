//! API Module
//!
//! JSON-RPC over HTTP for starting transfers and following their progress.

mod server;
pub use server::Server;
