use crate::context::CoordinatorContext;
use crate::correlator::ReplyFailure;
use crate::error::{Error, Result};
use crate::messages::types::RetrieveErrorCode;
use crate::messages::*;
use crate::placement::route::SegmentRoute;
use crate::placement::types::NodeId;
use crate::segment::checksum::Checksum;
use crate::segment::splitter::{Segment, join};

use bytes::{Bytes, BytesMut};
use futures::future::join_all;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedKey {
    pub avatar_id: u64,
    pub key: String,
    pub timestamp: f64,
    pub total_size: u64,
    pub content: Bytes,
}

/// One segment as read back from a node.
#[derive(Debug)]
struct FetchedSegment {
    node: NodeId,
    segment_number: u8,
    timestamp: f64,
    is_tombstone: bool,
    segment_count: u32,
    total_size: u64,
    checksum: Checksum,
    data: Bytes,
}

enum FetchError {
    /// The node does not have the segment.
    NotFound,
    /// Worth trying the next destination.
    Retry(String),
    /// The segment arrived but failed verification.
    Corrupt(Error),
    /// Reported to the caller without trying anywhere else.
    Surface(Error),
}

pub struct Retriever {
    ctx: Arc<CoordinatorContext>,
    avatar_id: u64,
    key: String,
}

impl Retriever {
    pub fn new(ctx: Arc<CoordinatorContext>, avatar_id: u64, key: impl Into<String>) -> Self {
        Self {
            ctx,
            avatar_id,
            key: key.into(),
        }
    }

    /// Reads and reassembles the key.
    ///
    /// A tombstoned key yields [`Error::Tombstoned`]; callers outside the
    /// coordination layer should treat it as not found.
    pub async fn retrieve(&self) -> Result<RetrievedKey> {
        let segment_count = self.ctx.ring.len();
        tracing::info!(
            "Retrieving {} for avatar {} from {} segments",
            self.key,
            self.avatar_id,
            segment_count
        );

        let results = join_all(
            (0..segment_count).map(move |index| self.retrieve_segment(index)),
        )
        .await;

        let mut segments = Vec::with_capacity(segment_count);
        let mut failure: Option<Error> = None;
        for result in results {
            match result {
                Ok(segment) => segments.push(segment),
                // Any other error outranks a plain not-found.
                Err(e) => {
                    if failure.as_ref().is_none_or(Error::is_not_found) {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(error) = failure {
            tracing::warn!("Retrieve of {} failed: {}", self.key, error);
            return Err(error);
        }

        let segments = self.catch_up(segments).await;

        if segments.iter().any(|segment| segment.is_tombstone) {
            tracing::info!("{} is tombstoned", self.key);
            return Err(Error::Tombstoned(self.key.clone()));
        }

        self.reassemble(segments)
    }

    /// Replaces segments older than the newest one read with a newer copy
    /// from further along their route.
    ///
    /// A primary that comes back after an outage still holds what it had
    /// before; whatever was written meanwhile lives on its handoff nodes.
    async fn catch_up(&self, segments: Vec<FetchedSegment>) -> Vec<FetchedSegment> {
        let newest = segments
            .iter()
            .map(|segment| segment.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);

        join_all(segments.into_iter().map(move |segment| async move {
            if segment.timestamp < newest {
                self.find_newer(segment, newest).await
            } else {
                segment
            }
        }))
        .await
    }

    /// Walks the segment's route past `stale.node`, keeping the newest copy
    /// seen. Stops early once a copy at `newest` turns up.
    async fn find_newer(&self, stale: FetchedSegment, newest: f64) -> FetchedSegment {
        let segment_number = stale.segment_number;
        let stale_node = stale.node.clone();
        tracing::info!(
            "Segment {} of {} from {} is older than {}, checking handoffs",
            segment_number,
            self.key,
            stale_node,
            newest
        );

        let mut route = SegmentRoute::new(segment_number as usize - 1);
        let mut best = stale;
        while let Some(node) = route.next(&self.ctx.ring) {
            if node == stale_node {
                continue;
            }
            match self.fetch_from(&node, segment_number).await {
                Ok(candidate) if candidate.timestamp > best.timestamp => {
                    tracing::debug!(
                        "Segment {} at {} found on {}",
                        segment_number,
                        candidate.timestamp,
                        node
                    );
                    best = candidate;
                    if best.timestamp >= newest {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!("No newer segment {} on {}", segment_number, node);
                }
            }
        }
        best
    }

    fn reassemble(&self, fetched: Vec<FetchedSegment>) -> Result<RetrievedKey> {
        let ring_size = self.ctx.ring.len();
        let Some(first) = fetched.first() else {
            return Err(Error::Inconsistent(format!("{}: no segments", self.key)));
        };
        let total_size = first.total_size;
        let timestamp = first.timestamp;

        for segment in &fetched {
            if segment.segment_count as usize != ring_size {
                return Err(Error::Inconsistent(format!(
                    "{}: {} reports {} segments, ring has {}",
                    self.key, segment.node, segment.segment_count, ring_size
                )));
            }
            if segment.total_size != total_size || segment.timestamp != timestamp {
                return Err(Error::Inconsistent(format!(
                    "{}: segment {} from {} belongs to a different version",
                    self.key, segment.segment_number, segment.node
                )));
            }
        }

        let held: u64 = fetched.iter().map(|s| s.data.len() as u64).sum();
        if held != total_size {
            return Err(Error::Inconsistent(format!(
                "{}: segments hold {} bytes, total size is {}",
                self.key, held, total_size
            )));
        }

        let mut segments: Vec<Segment> = fetched
            .into_iter()
            .map(|segment| Segment {
                number: segment.segment_number,
                data: segment.data,
                checksum: segment.checksum,
            })
            .collect();
        let content = join(&mut segments);

        tracing::info!("Retrieved {} ({} bytes)", self.key, total_size);
        Ok(RetrievedKey {
            avatar_id: self.avatar_id,
            key: self.key.clone(),
            timestamp,
            total_size,
            content,
        })
    }

    async fn retrieve_segment(&self, index: usize) -> Result<FetchedSegment> {
        let segment_number = (index + 1) as u8;
        let mut route = SegmentRoute::new(index);
        let mut attempts = 0;
        let mut not_found = 0;
        let mut corrupt = None;

        while let Some(node) = route.next(&self.ctx.ring) {
            attempts += 1;
            match self.fetch_from(&node, segment_number).await {
                Ok(segment) => return Ok(segment),
                Err(FetchError::NotFound) => {
                    tracing::debug!("Segment {} not on {}", segment_number, node);
                    not_found += 1;
                }
                Err(FetchError::Retry(reason)) => {
                    tracing::warn!(
                        "Segment {} unavailable from {}: {}",
                        segment_number,
                        node,
                        reason
                    );
                }
                Err(FetchError::Corrupt(e)) => {
                    tracing::warn!("{}", e);
                    corrupt = Some(e);
                }
                Err(FetchError::Surface(e)) => return Err(e),
            }
        }

        if attempts > 0 && not_found == attempts {
            return Err(Error::KeyNotFound(self.key.clone()));
        }
        Err(corrupt.unwrap_or(Error::SegmentUnavailable { segment_number }))
    }

    async fn fetch_from(
        &self,
        node: &NodeId,
        segment_number: u8,
    ) -> std::result::Result<FetchedSegment, FetchError> {
        let request_id = RequestId::new();
        let reply = self
            .ctx
            .request(
                node,
                Message::RetrieveKeyStart(RetrieveKeyStart {
                    request_id,
                    avatar_id: self.avatar_id,
                    segment_number,
                    key: self.key.clone(),
                }),
            )
            .await
            .map_err(|failure| self.classify(failure))?;

        let header = match reply {
            Message::RetrieveKeyStartReply(RetrieveKeyStartReply {
                result: Ok(header),
                ..
            }) => header,
            other => return Err(FetchError::Retry(format!("unexpected {}", other.kind()))),
        };

        if header.segment_number != segment_number {
            return Err(FetchError::Retry(format!(
                "asked for segment {}, got {}",
                segment_number, header.segment_number
            )));
        }

        if header.is_tombstone {
            return Ok(FetchedSegment {
                node: node.clone(),
                segment_number,
                timestamp: header.timestamp,
                is_tombstone: true,
                segment_count: header.segment_count,
                total_size: 0,
                checksum: Checksum::default(),
                data: Bytes::new(),
            });
        }

        let segment_size = header.segment_size as usize;
        // The size comes from the node; grow past one slice only as data arrives.
        let mut data = BytesMut::with_capacity(segment_size.min(self.ctx.slice_size));
        data.extend_from_slice(&header.data);

        let mut sequence = 1;
        while data.len() < segment_size {
            let chunk = self.fetch_chunk(node, request_id, sequence).await?;
            if chunk.is_empty() {
                return Err(FetchError::Retry(format!(
                    "segment {} ended at {} of {} bytes",
                    segment_number,
                    data.len(),
                    segment_size
                )));
            }
            data.extend_from_slice(&chunk);
            sequence += 1;
        }

        if data.len() != segment_size {
            return Err(FetchError::Retry(format!(
                "segment {} is {} bytes, expected {}",
                segment_number,
                data.len(),
                segment_size
            )));
        }

        if Checksum::compute(self.ctx.digest, &data) != header.checksum {
            return Err(FetchError::Corrupt(Error::ChecksumMismatch {
                segment_number,
                node: node.clone(),
            }));
        }

        Ok(FetchedSegment {
            node: node.clone(),
            segment_number,
            timestamp: header.timestamp,
            is_tombstone: false,
            segment_count: header.segment_count,
            total_size: header.total_size,
            checksum: header.checksum,
            data: data.freeze(),
        })
    }

    async fn fetch_chunk(
        &self,
        node: &NodeId,
        request_id: RequestId,
        sequence: u32,
    ) -> std::result::Result<Bytes, FetchError> {
        let reply = self
            .ctx
            .request(
                node,
                Message::RetrieveKeyNext(RetrieveKeyNext {
                    request_id,
                    sequence,
                }),
            )
            .await
            .map_err(|failure| self.classify(failure))?;

        match reply {
            Message::RetrieveKeyNextReply(RetrieveKeyNextReply {
                result: Ok(chunk), ..
            }) if chunk.sequence == sequence => Ok(chunk.data),
            other => Err(FetchError::Retry(format!(
                "unexpected {} for sequence {}",
                other.kind(),
                sequence
            ))),
        }
    }

    fn classify(&self, failure: ReplyFailure) -> FetchError {
        let ReplyFailure::Failed(message) = &failure else {
            return FetchError::Retry(failure.to_string());
        };
        let Some(error) = message.reply_error() else {
            return FetchError::Retry(failure.to_string());
        };

        match RetrieveErrorCode::from_code(error.code) {
            Some(RetrieveErrorCode::KeyNotFound) => FetchError::NotFound,
            Some(RetrieveErrorCode::InvalidDuplicate) => FetchError::Surface(
                Error::InvalidDuplicate(format!("{}: {}", self.key, error.message)),
            ),
            Some(RetrieveErrorCode::TimeoutWaitingKeyInsert) => FetchError::Surface(
                Error::TimeoutWaitingOnInsert(format!("{}: {}", self.key, error.message)),
            ),
            Some(RetrieveErrorCode::Exception) | Some(RetrieveErrorCode::Database) | None => {
                FetchError::Retry(failure.to_string())
            }
        }
    }
}
