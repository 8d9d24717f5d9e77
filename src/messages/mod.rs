//! Wire Message Module
//!
//! Fixed-layout binary messages exchanged with storage nodes.
//!
//! ## Core Concepts
//! - **Kinds**: Every message has a one-byte `MessageKind` carried next to its body.
//! - **Layout**: A fixed header in network byte order, then an optional variable tail.
//! - **Replies**: Result code 0 means success. Any other code carries only a
//!   length-prefixed error string, which `ReplyError` enforces.
//! - **Correlation**: All messages start with a 32-character hex request id.

pub mod marshal;
pub mod protocol;
pub mod types;

pub use protocol::*;
pub use types::{MessageKind, ReplyError, RequestId};
