use super::marshal::{Reader, put_bool, put_checksum, put_request_id, put_string};
use super::types::{MessageKind, ReplyError, RequestId};
use crate::error::MalformedMessage;
use crate::segment::checksum::Checksum;

use bytes::{BufMut, Bytes, BytesMut};
use std::num::NonZeroU8;

/// A whole segment in one message, for segments that fit in a single slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveKeyEntire {
    pub request_id: RequestId,
    pub avatar_id: u64,
    pub timestamp: f64,
    pub version: u32,
    pub segment_number: u8,
    pub total_size: u64,
    pub file_checksum: Checksum,
    pub segment_checksum: Checksum,
    pub key: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveKeyStart {
    pub request_id: RequestId,
    pub avatar_id: u64,
    pub timestamp: f64,
    pub sequence: u32,
    pub version: u32,
    pub segment_number: u8,
    pub segment_size: u32,
    pub key: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveKeyNext {
    pub request_id: RequestId,
    pub sequence: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveKeyFinal {
    pub request_id: RequestId,
    pub sequence: u32,
    pub total_size: u64,
    pub file_checksum: Checksum,
    pub segment_checksum: Checksum,
    pub data: Bytes,
}

/// Reply with no payload beyond the result: archive start/next and audit.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReply {
    pub request_id: RequestId,
    pub result: Result<(), ReplyError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveKeyFinalReply {
    pub request_id: RequestId,
    /// Size of the key's previous version on this node, 0 if none.
    pub result: Result<u64, ReplyError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveKeyStart {
    pub request_id: RequestId,
    pub avatar_id: u64,
    pub segment_number: u8,
    pub key: String,
}

/// Segment metadata plus the first chunk of its content.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedSegment {
    pub timestamp: f64,
    pub is_tombstone: bool,
    pub segment_number: u8,
    pub segment_count: u32,
    pub segment_size: u32,
    pub total_size: u64,
    pub checksum: Checksum,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveKeyStartReply {
    pub request_id: RequestId,
    pub result: Result<RetrievedSegment, ReplyError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveKeyNext {
    pub request_id: RequestId,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub sequence: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveKeyNextReply {
    pub request_id: RequestId,
    pub result: Result<RetrievedChunk, ReplyError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestroyKey {
    pub request_id: RequestId,
    pub avatar_id: u64,
    pub timestamp: f64,
    pub segment_number: u8,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestroyKeyReply {
    pub request_id: RequestId,
    /// Size of the key that was destroyed, 0 if it did not exist.
    pub result: Result<u64, ReplyError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AntiEntropyAudit {
    pub request_id: RequestId,
    pub avatar_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ArchiveKeyEntire(ArchiveKeyEntire),
    ArchiveKeyStart(ArchiveKeyStart),
    ArchiveKeyNext(ArchiveKeyNext),
    ArchiveKeyFinal(ArchiveKeyFinal),
    ArchiveKeyStartReply(StatusReply),
    ArchiveKeyNextReply(StatusReply),
    ArchiveKeyFinalReply(ArchiveKeyFinalReply),
    RetrieveKeyStart(RetrieveKeyStart),
    RetrieveKeyStartReply(RetrieveKeyStartReply),
    RetrieveKeyNext(RetrieveKeyNext),
    RetrieveKeyNextReply(RetrieveKeyNextReply),
    DestroyKey(DestroyKey),
    DestroyKeyReply(DestroyKeyReply),
    AntiEntropyAudit(AntiEntropyAudit),
    AntiEntropyAuditReply(StatusReply),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ArchiveKeyEntire(_) => MessageKind::ArchiveKeyEntire,
            Message::ArchiveKeyStart(_) => MessageKind::ArchiveKeyStart,
            Message::ArchiveKeyNext(_) => MessageKind::ArchiveKeyNext,
            Message::ArchiveKeyFinal(_) => MessageKind::ArchiveKeyFinal,
            Message::ArchiveKeyStartReply(_) => MessageKind::ArchiveKeyStartReply,
            Message::ArchiveKeyNextReply(_) => MessageKind::ArchiveKeyNextReply,
            Message::ArchiveKeyFinalReply(_) => MessageKind::ArchiveKeyFinalReply,
            Message::RetrieveKeyStart(_) => MessageKind::RetrieveKeyStart,
            Message::RetrieveKeyStartReply(_) => MessageKind::RetrieveKeyStartReply,
            Message::RetrieveKeyNext(_) => MessageKind::RetrieveKeyNext,
            Message::RetrieveKeyNextReply(_) => MessageKind::RetrieveKeyNextReply,
            Message::DestroyKey(_) => MessageKind::DestroyKey,
            Message::DestroyKeyReply(_) => MessageKind::DestroyKeyReply,
            Message::AntiEntropyAudit(_) => MessageKind::AntiEntropyAudit,
            Message::AntiEntropyAuditReply(_) => MessageKind::AntiEntropyAuditReply,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            Message::ArchiveKeyEntire(m) => m.request_id,
            Message::ArchiveKeyStart(m) => m.request_id,
            Message::ArchiveKeyNext(m) => m.request_id,
            Message::ArchiveKeyFinal(m) => m.request_id,
            Message::ArchiveKeyStartReply(m)
            | Message::ArchiveKeyNextReply(m)
            | Message::AntiEntropyAuditReply(m) => m.request_id,
            Message::ArchiveKeyFinalReply(m) => m.request_id,
            Message::RetrieveKeyStart(m) => m.request_id,
            Message::RetrieveKeyStartReply(m) => m.request_id,
            Message::RetrieveKeyNext(m) => m.request_id,
            Message::RetrieveKeyNextReply(m) => m.request_id,
            Message::DestroyKey(m) => m.request_id,
            Message::DestroyKeyReply(m) => m.request_id,
            Message::AntiEntropyAudit(m) => m.request_id,
        }
    }

    /// The error carried by a failed reply. `None` for requests and successes.
    pub fn reply_error(&self) -> Option<&ReplyError> {
        match self {
            Message::ArchiveKeyStartReply(m)
            | Message::ArchiveKeyNextReply(m)
            | Message::AntiEntropyAuditReply(m) => m.result.as_ref().err(),
            Message::ArchiveKeyFinalReply(m) => m.result.as_ref().err(),
            Message::RetrieveKeyStartReply(m) => m.result.as_ref().err(),
            Message::RetrieveKeyNextReply(m) => m.result.as_ref().err(),
            Message::DestroyKeyReply(m) => m.result.as_ref().err(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.reply_error().is_some()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());

        match self {
            Message::ArchiveKeyEntire(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u64(m.avatar_id);
                buf.put_f64(m.timestamp);
                buf.put_u32(m.version);
                buf.put_u8(m.segment_number);
                buf.put_u64(m.total_size);
                put_checksum(&mut buf, &m.file_checksum);
                put_checksum(&mut buf, &m.segment_checksum);
                put_string(&mut buf, &m.key);
                buf.put_slice(&m.data);
            }
            Message::ArchiveKeyStart(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u64(m.avatar_id);
                buf.put_f64(m.timestamp);
                buf.put_u32(m.sequence);
                buf.put_u32(m.version);
                buf.put_u8(m.segment_number);
                buf.put_u32(m.segment_size);
                put_string(&mut buf, &m.key);
                buf.put_slice(&m.data);
            }
            Message::ArchiveKeyNext(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u32(m.sequence);
                buf.put_slice(&m.data);
            }
            Message::ArchiveKeyFinal(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u32(m.sequence);
                buf.put_u64(m.total_size);
                put_checksum(&mut buf, &m.file_checksum);
                put_checksum(&mut buf, &m.segment_checksum);
                buf.put_slice(&m.data);
            }
            Message::ArchiveKeyStartReply(m)
            | Message::ArchiveKeyNextReply(m)
            | Message::AntiEntropyAuditReply(m) => {
                put_request_id(&mut buf, &m.request_id);
                put_outcome(&mut buf, &m.result, |_, _| {});
            }
            Message::ArchiveKeyFinalReply(m) => {
                put_request_id(&mut buf, &m.request_id);
                put_outcome(&mut buf, &m.result, |buf, previous_size| {
                    buf.put_u64(*previous_size)
                });
            }
            Message::RetrieveKeyStart(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u64(m.avatar_id);
                buf.put_u8(m.segment_number);
                put_string(&mut buf, &m.key);
            }
            Message::RetrieveKeyStartReply(m) => {
                put_request_id(&mut buf, &m.request_id);
                put_outcome(&mut buf, &m.result, |buf, segment| {
                    buf.put_f64(segment.timestamp);
                    put_bool(buf, segment.is_tombstone);
                    buf.put_u8(segment.segment_number);
                    buf.put_u32(segment.segment_count);
                    buf.put_u32(segment.segment_size);
                    buf.put_u64(segment.total_size);
                    put_checksum(buf, &segment.checksum);
                    buf.put_slice(&segment.data);
                });
            }
            Message::RetrieveKeyNext(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u32(m.sequence);
            }
            Message::RetrieveKeyNextReply(m) => {
                put_request_id(&mut buf, &m.request_id);
                put_outcome(&mut buf, &m.result, |buf, chunk| {
                    buf.put_u32(chunk.sequence);
                    buf.put_slice(&chunk.data);
                });
            }
            Message::DestroyKey(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u64(m.avatar_id);
                buf.put_f64(m.timestamp);
                buf.put_u8(m.segment_number);
                put_string(&mut buf, &m.key);
            }
            Message::DestroyKeyReply(m) => {
                put_request_id(&mut buf, &m.request_id);
                put_outcome(&mut buf, &m.result, |buf, size| buf.put_u64(*size));
            }
            Message::AntiEntropyAudit(m) => {
                put_request_id(&mut buf, &m.request_id);
                buf.put_u64(m.avatar_id);
            }
        }

        buf.freeze()
    }

    pub fn decode(kind: MessageKind, body: &[u8]) -> Result<Message, MalformedMessage> {
        let mut r = Reader::new(body);
        let request_id = r.request_id()?;

        let message = match kind {
            MessageKind::ArchiveKeyEntire => Message::ArchiveKeyEntire(ArchiveKeyEntire {
                request_id,
                avatar_id: r.u64("avatar_id")?,
                timestamp: r.f64("timestamp")?,
                version: r.u32("version")?,
                segment_number: r.u8("segment_number")?,
                total_size: r.u64("total_size")?,
                file_checksum: r.checksum("file_checksum")?,
                segment_checksum: r.checksum("segment_checksum")?,
                key: r.string("key")?,
                data: r.tail(),
            }),
            MessageKind::ArchiveKeyStart => Message::ArchiveKeyStart(ArchiveKeyStart {
                request_id,
                avatar_id: r.u64("avatar_id")?,
                timestamp: r.f64("timestamp")?,
                sequence: r.u32("sequence")?,
                version: r.u32("version")?,
                segment_number: r.u8("segment_number")?,
                segment_size: r.u32("segment_size")?,
                key: r.string("key")?,
                data: r.tail(),
            }),
            MessageKind::ArchiveKeyNext => Message::ArchiveKeyNext(ArchiveKeyNext {
                request_id,
                sequence: r.u32("sequence")?,
                data: r.tail(),
            }),
            MessageKind::ArchiveKeyFinal => Message::ArchiveKeyFinal(ArchiveKeyFinal {
                request_id,
                sequence: r.u32("sequence")?,
                total_size: r.u64("total_size")?,
                file_checksum: r.checksum("file_checksum")?,
                segment_checksum: r.checksum("segment_checksum")?,
                data: r.tail(),
            }),
            MessageKind::ArchiveKeyStartReply => Message::ArchiveKeyStartReply(StatusReply {
                request_id,
                result: read_outcome(&mut r, |_| Ok(()))?,
            }),
            MessageKind::ArchiveKeyNextReply => Message::ArchiveKeyNextReply(StatusReply {
                request_id,
                result: read_outcome(&mut r, |_| Ok(()))?,
            }),
            MessageKind::AntiEntropyAuditReply => Message::AntiEntropyAuditReply(StatusReply {
                request_id,
                result: read_outcome(&mut r, |_| Ok(()))?,
            }),
            MessageKind::ArchiveKeyFinalReply => {
                Message::ArchiveKeyFinalReply(ArchiveKeyFinalReply {
                    request_id,
                    result: read_outcome(&mut r, |r| r.u64("previous_size"))?,
                })
            }
            MessageKind::RetrieveKeyStart => Message::RetrieveKeyStart(RetrieveKeyStart {
                request_id,
                avatar_id: r.u64("avatar_id")?,
                segment_number: r.u8("segment_number")?,
                key: r.string("key")?,
            }),
            MessageKind::RetrieveKeyStartReply => {
                Message::RetrieveKeyStartReply(RetrieveKeyStartReply {
                    request_id,
                    result: read_outcome(&mut r, |r| {
                        Ok(RetrievedSegment {
                            timestamp: r.f64("timestamp")?,
                            is_tombstone: r.bool("is_tombstone")?,
                            segment_number: r.u8("segment_number")?,
                            segment_count: r.u32("segment_count")?,
                            segment_size: r.u32("segment_size")?,
                            total_size: r.u64("total_size")?,
                            checksum: r.checksum("checksum")?,
                            data: r.tail(),
                        })
                    })?,
                })
            }
            MessageKind::RetrieveKeyNext => Message::RetrieveKeyNext(RetrieveKeyNext {
                request_id,
                sequence: r.u32("sequence")?,
            }),
            MessageKind::RetrieveKeyNextReply => {
                Message::RetrieveKeyNextReply(RetrieveKeyNextReply {
                    request_id,
                    result: read_outcome(&mut r, |r| {
                        Ok(RetrievedChunk {
                            sequence: r.u32("sequence")?,
                            data: r.tail(),
                        })
                    })?,
                })
            }
            MessageKind::DestroyKey => Message::DestroyKey(DestroyKey {
                request_id,
                avatar_id: r.u64("avatar_id")?,
                timestamp: r.f64("timestamp")?,
                segment_number: r.u8("segment_number")?,
                key: r.string("key")?,
            }),
            MessageKind::DestroyKeyReply => Message::DestroyKeyReply(DestroyKeyReply {
                request_id,
                result: read_outcome(&mut r, |r| r.u64("destroyed_size"))?,
            }),
            MessageKind::AntiEntropyAudit => Message::AntiEntropyAudit(AntiEntropyAudit {
                request_id,
                avatar_id: r.u64("avatar_id")?,
            }),
        };

        r.finish()?;
        Ok(message)
    }

    fn encoded_len_hint(&self) -> usize {
        let tail = match self {
            Message::ArchiveKeyEntire(m) => m.key.len() + m.data.len(),
            Message::ArchiveKeyStart(m) => m.key.len() + m.data.len(),
            Message::ArchiveKeyNext(m) => m.data.len(),
            Message::ArchiveKeyFinal(m) => m.data.len(),
            Message::RetrieveKeyStartReply(RetrieveKeyStartReply {
                result: Ok(segment),
                ..
            }) => segment.data.len(),
            Message::RetrieveKeyNextReply(RetrieveKeyNextReply {
                result: Ok(chunk), ..
            }) => chunk.data.len(),
            _ => 0,
        };
        128 + tail
    }
}

fn put_outcome<T>(
    buf: &mut BytesMut,
    outcome: &Result<T, ReplyError>,
    success: impl FnOnce(&mut BytesMut, &T),
) {
    match outcome {
        Ok(value) => {
            buf.put_u8(0);
            success(buf, value);
        }
        Err(error) => {
            buf.put_u8(error.code.get());
            put_string(buf, &error.message);
        }
    }
}

fn read_outcome<T>(
    r: &mut Reader<'_>,
    success: impl FnOnce(&mut Reader<'_>) -> Result<T, MalformedMessage>,
) -> Result<Result<T, ReplyError>, MalformedMessage> {
    match NonZeroU8::new(r.u8("result")?) {
        None => Ok(Ok(success(r)?)),
        Some(code) => {
            let message = r.string("error_message")?;
            Ok(Err(ReplyError { code, message }))
        }
    }
}
