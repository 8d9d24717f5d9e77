//! Transport Module
//!
//! Outbound queues from the coordinator to storage nodes, and the framing
//! used on the wire.
//!
//! ## Core Concepts
//! - **Dispatcher**: Enqueues a message for a node without waiting for the reply.
//! - **Frames**: `kind u8 | length u32 | body`, network byte order.
//! - **Memory**: One tokio channel per node, used by tests and single-process clusters.
//! - **TCP**: One writer task per node with lazy reconnect. Replies read off the same
//!   connection are handed to the `ReplyCorrelator`.

pub mod frame;
pub mod memory;
pub mod tcp;

pub use frame::Frame;
pub use memory::MemoryDispatcher;
pub use tcp::TcpDispatcher;

use crate::error::Result;
use crate::messages::Message;
use crate::placement::types::NodeId;

/// Sends requests to storage nodes.
///
/// `send` only enqueues. Delivery failures surface as a missing reply, which
/// the caller sees as a timeout.
pub trait Dispatcher: Send + Sync {
    fn send(&self, node: &NodeId, message: Message) -> Result<()>;
}
