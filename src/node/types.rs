use crate::messages::RequestId;
use crate::segment::checksum::{Checksum, RunningChecksum};
use bytes::{Bytes, BytesMut};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub avatar_id: u64,
    pub key: String,
    pub segment_number: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSegment {
    pub timestamp: f64,
    pub version: u32,
    pub is_tombstone: bool,
    pub total_size: u64,
    pub file_checksum: Checksum,
    pub checksum: Checksum,
    pub data: Bytes,
}

impl StoredSegment {
    pub fn tombstone(timestamp: f64) -> Self {
        Self {
            timestamp,
            version: 0,
            is_tombstone: true,
            total_size: 0,
            file_checksum: Checksum::default(),
            checksum: Checksum::default(),
            data: Bytes::new(),
        }
    }
}

/// A sliced archive in progress.
#[derive(Debug)]
pub(crate) struct Upload {
    pub key: SegmentKey,
    pub timestamp: f64,
    pub version: u32,
    pub segment_size: u32,
    pub next_sequence: u32,
    pub running: RunningChecksum,
    pub data: BytesMut,
    pub touched_at: Instant,
}

/// A sliced retrieve in progress.
#[derive(Debug)]
pub(crate) struct ReadCursor {
    pub request_id: RequestId,
    pub data: Bytes,
    pub offset: usize,
    pub next_sequence: u32,
    pub touched_at: Instant,
}
