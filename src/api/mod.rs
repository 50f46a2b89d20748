//! HTTP API module.
//!
//! Exposes the exporters over REST plus an SSE log stream.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::start_server;
pub use types::*;
