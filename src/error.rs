//! Error taxonomy for the coordination layer.
//!
//! `MalformedMessage` is codec-level and never retried. `NodeUnavailable` is
//! the signal that drives handoff. Everything else is what a caller of the
//! archive/retrieve/destroy operations can observe.

use crate::placement::types::NodeId;
use thiserror::Error;

/// A wire message that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    #[error("truncated {field}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    #[error("request id is not 32 hex characters")]
    InvalidRequestId,

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u64 },

    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] MalformedMessage),

    #[error("node {node} unavailable: {reason}")]
    NodeUnavailable { node: NodeId, reason: String },

    #[error(
        "archive failed: segment {segment_number} exhausted {} destination(s)",
        .attempts.len()
    )]
    ArchiveFailed {
        segment_number: u8,
        attempts: Vec<(NodeId, String)>,
    },

    #[error(
        "destroy failed: segment {segment_number} exhausted {} destination(s)",
        .attempts.len()
    )]
    DestroyFailed {
        segment_number: u8,
        attempts: Vec<(NodeId, String)>,
    },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key is tombstoned: {0}")]
    Tombstoned(String),

    #[error("invalid duplicate: {0}")]
    InvalidDuplicate(String),

    #[error("timeout waiting on concurrent insert: {0}")]
    TimeoutWaitingOnInsert(String),

    #[error("checksum mismatch on segment {segment_number} from {node}")]
    ChecksumMismatch { segment_number: u8, node: NodeId },

    #[error("segment {segment_number} unavailable on every destination")]
    SegmentUnavailable { segment_number: u8 },

    #[error("inconsistent key: {0}")]
    Inconsistent(String),

    #[error("dispatch to {node} failed: {reason}")]
    Dispatch { node: NodeId, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("content stream error: {0}")]
    ContentStream(String),

    #[error("object of {size} bytes exceeds the {limit} byte limit")]
    ObjectTooLarge { size: u64, limit: u64 },
}

impl Error {
    /// True for the errors a caller should treat as "the key does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_) | Error::Tombstoned(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
