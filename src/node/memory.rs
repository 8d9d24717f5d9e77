use super::types::{ReadCursor, SegmentKey, StoredSegment, Upload};
use crate::messages::types::{ArchiveErrorCode, RetrieveErrorCode};
use crate::messages::*;
use crate::placement::types::NodeId;
use crate::segment::checksum::{Checksum, DigestAlgorithm, RunningChecksum};

use bytes::BytesMut;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// How long an unfinished upload or read may sit untouched before a later
/// start request drops it.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct MemoryNode {
    name: NodeId,
    segment_count: u32,
    slice_size: usize,
    digest: DigestAlgorithm,
    idle_timeout: Duration,
    store: DashMap<SegmentKey, Vec<StoredSegment>>,
    uploads: DashMap<RequestId, Upload>,
    cursors: DashMap<RequestId, ReadCursor>,
}

impl MemoryNode {
    pub fn new(
        name: NodeId,
        segment_count: u32,
        slice_size: usize,
        digest: DigestAlgorithm,
    ) -> Self {
        Self {
            name,
            segment_count,
            slice_size: slice_size.max(1),
            digest,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            store: DashMap::new(),
            uploads: DashMap::new(),
            cursors: DashMap::new(),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn name(&self) -> &NodeId {
        &self.name
    }

    /// Newest entry for a segment, tombstones included.
    pub fn latest(&self, avatar_id: u64, key: &str, segment_number: u8) -> Option<StoredSegment> {
        let key = SegmentKey {
            avatar_id,
            key: key.to_string(),
            segment_number,
        };
        self.store
            .get(&key)
            .and_then(|history| history.last().cloned())
    }

    /// Number of segments holding live (non-tombstone) content.
    pub fn live_segment_count(&self) -> usize {
        self.store
            .iter()
            .filter(|entry| entry.value().last().is_some_and(|s| !s.is_tombstone))
            .count()
    }

    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    pub fn pending_reads(&self) -> usize {
        self.cursors.len()
    }

    /// Drops uploads and reads their coordinator has stopped driving.
    fn evict_idle(&self) {
        let timeout = self.idle_timeout;
        let before = self.uploads.len() + self.cursors.len();
        self.uploads
            .retain(|_, upload| upload.touched_at.elapsed() < timeout);
        self.cursors
            .retain(|_, cursor| cursor.touched_at.elapsed() < timeout);

        let evicted = before.saturating_sub(self.uploads.len() + self.cursors.len());
        if evicted > 0 {
            tracing::debug!("{} evicted {} idle transfer(s)", self.name, evicted);
        }
    }

    /// Applies one request and returns the reply, or `None` for messages a
    /// node never receives.
    pub fn handle(&self, message: Message) -> Option<Message> {
        tracing::debug!("{} handling {}", self.name, message.kind());

        let reply = match message {
            Message::ArchiveKeyEntire(m) => Message::ArchiveKeyFinalReply(ArchiveKeyFinalReply {
                request_id: m.request_id,
                result: self.archive_entire(m),
            }),
            Message::ArchiveKeyStart(m) => Message::ArchiveKeyStartReply(StatusReply {
                request_id: m.request_id,
                result: self.archive_start(m),
            }),
            Message::ArchiveKeyNext(m) => Message::ArchiveKeyNextReply(StatusReply {
                request_id: m.request_id,
                result: self.archive_next(m),
            }),
            Message::ArchiveKeyFinal(m) => Message::ArchiveKeyFinalReply(ArchiveKeyFinalReply {
                request_id: m.request_id,
                result: self.archive_final(m),
            }),
            Message::RetrieveKeyStart(m) => Message::RetrieveKeyStartReply(RetrieveKeyStartReply {
                request_id: m.request_id,
                result: self.retrieve_start(m),
            }),
            Message::RetrieveKeyNext(m) => Message::RetrieveKeyNextReply(RetrieveKeyNextReply {
                request_id: m.request_id,
                result: self.retrieve_next(m),
            }),
            Message::DestroyKey(m) => Message::DestroyKeyReply(DestroyKeyReply {
                request_id: m.request_id,
                result: Ok(self.destroy(m)),
            }),
            Message::AntiEntropyAudit(m) => Message::AntiEntropyAuditReply(StatusReply {
                request_id: m.request_id,
                result: Ok(()),
            }),
            other => {
                tracing::warn!("{} ignoring unexpected {}", self.name, other.kind());
                return None;
            }
        };

        if let Some(error) = reply.reply_error() {
            tracing::warn!("{} rejected {}: {}", self.name, reply.kind(), error);
        }
        Some(reply)
    }

    fn archive_entire(&self, m: ArchiveKeyEntire) -> Result<u64, ReplyError> {
        let actual = Checksum::compute(self.digest, &m.data);
        if actual != m.segment_checksum {
            return Err(ArchiveErrorCode::ChecksumMismatch.reply(format!(
                "segment {} checksum mismatch",
                m.segment_number
            )));
        }

        let key = SegmentKey {
            avatar_id: m.avatar_id,
            key: m.key,
            segment_number: m.segment_number,
        };
        Ok(self.store_segment(
            key,
            StoredSegment {
                timestamp: m.timestamp,
                version: m.version,
                is_tombstone: false,
                total_size: m.total_size,
                file_checksum: m.file_checksum,
                checksum: m.segment_checksum,
                data: m.data,
            },
        ))
    }

    fn archive_start(&self, m: ArchiveKeyStart) -> Result<(), ReplyError> {
        if m.sequence != 0 {
            return Err(ArchiveErrorCode::OutOfSequence
                .reply(format!("start with sequence {}", m.sequence)));
        }

        self.evict_idle();

        let mut running = RunningChecksum::new(self.digest);
        running.update(&m.data);
        let mut data = BytesMut::with_capacity((m.segment_size as usize).min(self.slice_size));
        data.extend_from_slice(&m.data);

        self.uploads.insert(
            m.request_id,
            Upload {
                key: SegmentKey {
                    avatar_id: m.avatar_id,
                    key: m.key,
                    segment_number: m.segment_number,
                },
                timestamp: m.timestamp,
                version: m.version,
                segment_size: m.segment_size,
                next_sequence: 1,
                running,
                data,
                touched_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn archive_next(&self, m: ArchiveKeyNext) -> Result<(), ReplyError> {
        let Some(mut upload) = self.uploads.get_mut(&m.request_id) else {
            return Err(ArchiveErrorCode::UnknownRequest.reply("no archive in progress"));
        };
        if m.sequence != upload.next_sequence {
            let expected = upload.next_sequence;
            drop(upload);
            self.uploads.remove(&m.request_id);
            return Err(ArchiveErrorCode::OutOfSequence
                .reply(format!("expected sequence {}, got {}", expected, m.sequence)));
        }

        upload.running.update(&m.data);
        upload.data.extend_from_slice(&m.data);
        upload.next_sequence += 1;
        upload.touched_at = Instant::now();
        Ok(())
    }

    fn archive_final(&self, m: ArchiveKeyFinal) -> Result<u64, ReplyError> {
        let Some((_, mut upload)) = self.uploads.remove(&m.request_id) else {
            return Err(ArchiveErrorCode::UnknownRequest.reply("no archive in progress"));
        };
        if m.sequence != upload.next_sequence {
            return Err(ArchiveErrorCode::OutOfSequence.reply(format!(
                "expected sequence {}, got {}",
                upload.next_sequence, m.sequence
            )));
        }

        upload.running.update(&m.data);
        upload.data.extend_from_slice(&m.data);

        if upload.running.bytes() != u64::from(upload.segment_size) {
            return Err(ArchiveErrorCode::ChecksumMismatch.reply(format!(
                "segment size {} does not match announced {}",
                upload.running.bytes(),
                upload.segment_size
            )));
        }
        if upload.running.finish() != m.segment_checksum {
            return Err(ArchiveErrorCode::ChecksumMismatch.reply(format!(
                "segment {} checksum mismatch",
                upload.key.segment_number
            )));
        }

        Ok(self.store_segment(
            upload.key,
            StoredSegment {
                timestamp: upload.timestamp,
                version: upload.version,
                is_tombstone: false,
                total_size: m.total_size,
                file_checksum: m.file_checksum,
                checksum: m.segment_checksum,
                data: upload.data.freeze(),
            },
        ))
    }

    /// Appends `segment` to the history and returns the previous live size.
    fn store_segment(&self, key: SegmentKey, segment: StoredSegment) -> u64 {
        let mut history = self.store.entry(key).or_default();
        let previous = previous_size(&history);
        history.push(segment);
        previous
    }

    fn retrieve_start(&self, m: RetrieveKeyStart) -> Result<RetrievedSegment, ReplyError> {
        self.evict_idle();

        let Some(stored) = self.latest(m.avatar_id, &m.key, m.segment_number) else {
            return Err(RetrieveErrorCode::KeyNotFound
                .reply(format!("{} segment {} not found", m.key, m.segment_number)));
        };

        if stored.is_tombstone {
            return Ok(RetrievedSegment {
                timestamp: stored.timestamp,
                is_tombstone: true,
                segment_number: m.segment_number,
                segment_count: self.segment_count,
                segment_size: 0,
                total_size: 0,
                checksum: Checksum::default(),
                data: bytes::Bytes::new(),
            });
        }

        let first_len = stored.data.len().min(self.slice_size);
        if first_len < stored.data.len() {
            self.cursors.insert(
                m.request_id,
                ReadCursor {
                    request_id: m.request_id,
                    data: stored.data.clone(),
                    offset: first_len,
                    next_sequence: 1,
                    touched_at: Instant::now(),
                },
            );
        }

        Ok(RetrievedSegment {
            timestamp: stored.timestamp,
            is_tombstone: false,
            segment_number: m.segment_number,
            segment_count: self.segment_count,
            segment_size: stored.data.len() as u32,
            total_size: stored.total_size,
            checksum: stored.checksum,
            data: stored.data.slice(..first_len),
        })
    }

    fn retrieve_next(&self, m: RetrieveKeyNext) -> Result<RetrievedChunk, ReplyError> {
        let Some((_, mut cursor)) = self.cursors.remove(&m.request_id) else {
            return Err(RetrieveErrorCode::Exception.reply("no retrieve in progress"));
        };
        if m.sequence != cursor.next_sequence {
            return Err(RetrieveErrorCode::Exception.reply(format!(
                "expected sequence {}, got {}",
                cursor.next_sequence, m.sequence
            )));
        }

        let end = (cursor.offset + self.slice_size).min(cursor.data.len());
        let chunk = RetrievedChunk {
            sequence: m.sequence,
            data: cursor.data.slice(cursor.offset..end),
        };

        cursor.offset = end;
        cursor.next_sequence += 1;
        cursor.touched_at = Instant::now();
        if cursor.offset < cursor.data.len() {
            self.cursors.insert(cursor.request_id, cursor);
        }
        Ok(chunk)
    }

    fn destroy(&self, m: DestroyKey) -> u64 {
        let key = SegmentKey {
            avatar_id: m.avatar_id,
            key: m.key,
            segment_number: m.segment_number,
        };
        self.store_segment(key, StoredSegment::tombstone(m.timestamp))
    }
}

fn previous_size(history: &[StoredSegment]) -> u64 {
    match history.last() {
        Some(latest) if !latest.is_tombstone => latest.total_size,
        _ => 0,
    }
}
