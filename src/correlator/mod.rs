//! Reply Correlation Module
//!
//! Matches replies from storage nodes to the coordination step waiting on them.
//!
//! ## Core Concepts
//! - **Keys**: A pending reply is keyed by (request id, destination node).
//! - **Expected kind**: Only a reply of the kind the request calls for fulfils the entry.
//! - **One-shot slots**: Each registration owns a `oneshot` channel, fulfilled at most once.
//! - **Cleanup**: The waiter removes its own entry on success, timeout or drop. A stale
//!   waiter never removes a newer registration of the same key.

pub mod correlator;
pub mod types;

pub use correlator::{PendingReply, ReplyCorrelator};
pub use types::{CorrelationKey, ReplyFailure};
