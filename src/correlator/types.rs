use crate::messages::{Message, RequestId};
use crate::placement::types::NodeId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub request_id: RequestId,
    pub node: NodeId,
}

/// Why a coordination step did not get a usable reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyFailure {
    TimedOut,
    /// The node answered with a nonzero result code.
    Failed(Message),
    /// The slot was dropped, usually because the key was registered again.
    Closed,
    /// The request never left this process.
    Dispatch(String),
}

impl fmt::Display for ReplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyFailure::TimedOut => f.write_str("timed out waiting for reply"),
            ReplyFailure::Failed(message) => match message.reply_error() {
                Some(error) => write!(f, "{} failed with {}", message.kind(), error),
                None => write!(f, "{} failed", message.kind()),
            },
            ReplyFailure::Closed => f.write_str("reply slot closed"),
            ReplyFailure::Dispatch(reason) => write!(f, "dispatch failed: {}", reason),
        }
    }
}
