use crate::context::CoordinatorContext;
use crate::correlator::ReplyFailure;
use crate::error::{Error, Result};
use crate::messages::*;
use crate::placement::types::NodeId;
use crate::segment::checksum::Checksum;
use crate::segment::splitter::{Segment, split};

use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;

pub struct Archiver {
    ctx: Arc<CoordinatorContext>,
    avatar_id: u64,
    key: String,
    version: u32,
    timestamp: f64,
}

/// What every segment of one archive shares.
#[derive(Clone, Copy)]
struct FileInfo {
    total_size: u64,
    checksum: Checksum,
}

impl Archiver {
    pub fn new(
        ctx: Arc<CoordinatorContext>,
        avatar_id: u64,
        key: impl Into<String>,
        version: u32,
        timestamp: f64,
    ) -> Self {
        Self {
            ctx,
            avatar_id,
            key: key.into(),
            version,
            timestamp,
        }
    }

    /// Archives `content` and returns the size of the key's previous version
    /// (0 if there was none).
    ///
    /// Fails with [`Error::ArchiveFailed`] if any segment exhausts its
    /// destinations, even when the other segments were stored.
    pub async fn archive_final(&self, content: Bytes) -> Result<u64> {
        let limit = segmented_size_limit(self.ctx.ring.len());
        if content.len() as u64 > limit {
            return Err(Error::ObjectTooLarge {
                size: content.len() as u64,
                limit,
            });
        }

        let file = FileInfo {
            total_size: content.len() as u64,
            checksum: Checksum::compute(self.ctx.digest, &content),
        };
        let segments = split(&content, self.ctx.ring.len(), self.ctx.digest);

        tracing::info!(
            "Archiving {} ({} bytes) for avatar {} in {} segments",
            self.key,
            file.total_size,
            self.avatar_id,
            segments.len()
        );

        let results = join_all(
            segments
                .iter()
                .map(move |segment| self.archive_segment(segment, file)),
        )
        .await;

        let mut previous_size = 0;
        let mut failure = None;
        for (segment, result) in segments.iter().zip(results) {
            match result {
                Ok(size) => previous_size = previous_size.max(size),
                Err(attempts) => {
                    tracing::error!(
                        "Archive of {} failed: segment {} exhausted {} destination(s)",
                        self.key,
                        segment.number,
                        attempts.len()
                    );
                    failure.get_or_insert(Error::ArchiveFailed {
                        segment_number: segment.number,
                        attempts,
                    });
                }
            }
        }

        if let Some(error) = failure {
            return Err(error);
        }

        tracing::info!(
            "Archived {} for avatar {} (previous size {})",
            self.key,
            self.avatar_id,
            previous_size
        );
        Ok(previous_size)
    }

    async fn archive_segment(
        &self,
        segment: &Segment,
        file: FileInfo,
    ) -> std::result::Result<u64, Vec<(NodeId, String)>> {
        self.ctx
            .write_with_handoff(segment.index(), move |node| {
                self.send_segment(node, segment, file)
            })
            .await
            .map(|(_, previous_size)| previous_size)
    }

    /// One complete attempt at storing `segment` on `node`.
    async fn send_segment(
        &self,
        node: NodeId,
        segment: &Segment,
        file: FileInfo,
    ) -> std::result::Result<u64, ReplyFailure> {
        let request_id = RequestId::new();
        let slice_size = self.ctx.slice_size;

        if segment.slice_count(slice_size) == 1 {
            tracing::debug!("Sending segment {} entire to {}", segment.number, node);
            let reply = self
                .ctx
                .request(
                    &node,
                    Message::ArchiveKeyEntire(ArchiveKeyEntire {
                        request_id,
                        avatar_id: self.avatar_id,
                        timestamp: self.timestamp,
                        version: self.version,
                        segment_number: segment.number,
                        total_size: file.total_size,
                        file_checksum: file.checksum,
                        segment_checksum: segment.checksum,
                        key: self.key.clone(),
                        data: segment.data.clone(),
                    }),
                )
                .await?;
            return previous_size(reply);
        }

        let segment_size = u32::try_from(segment.len()).map_err(|_| {
            ReplyFailure::Dispatch(format!(
                "segment {} of {} bytes does not fit the wire format",
                segment.number,
                segment.len()
            ))
        })?;

        for slice in segment.slices(slice_size, self.ctx.digest) {
            let message = if slice.is_first() {
                Message::ArchiveKeyStart(ArchiveKeyStart {
                    request_id,
                    avatar_id: self.avatar_id,
                    timestamp: self.timestamp,
                    sequence: slice.sequence,
                    version: self.version,
                    segment_number: segment.number,
                    segment_size,
                    key: self.key.clone(),
                    data: slice.data,
                })
            } else if slice.is_last {
                Message::ArchiveKeyFinal(ArchiveKeyFinal {
                    request_id,
                    sequence: slice.sequence,
                    total_size: file.total_size,
                    file_checksum: file.checksum,
                    segment_checksum: slice.checksum,
                    data: slice.data,
                })
            } else {
                Message::ArchiveKeyNext(ArchiveKeyNext {
                    request_id,
                    sequence: slice.sequence,
                    data: slice.data,
                })
            };

            tracing::debug!(
                "Sending segment {} slice {} to {}",
                segment.number,
                slice.sequence,
                node
            );
            let reply = self.ctx.request(&node, message).await?;
            if slice.is_last {
                return previous_size(reply);
            }
        }

        Err(ReplyFailure::Dispatch(format!(
            "segment {} produced no final slice",
            segment.number
        )))
    }
}

/// Largest object whose segments all fit the 32-bit segment size field.
pub fn segmented_size_limit(node_count: usize) -> u64 {
    u64::from(u32::MAX).saturating_mul(node_count as u64)
}

fn previous_size(reply: Message) -> std::result::Result<u64, ReplyFailure> {
    match reply {
        Message::ArchiveKeyFinalReply(ArchiveKeyFinalReply {
            result: Ok(size), ..
        }) => Ok(size),
        other => Err(ReplyFailure::Failed(other)),
    }
}
