//! Checked big-endian reads and the matching writers.

use super::types::{REQUEST_ID_LEN, RequestId};
use crate::error::MalformedMessage;
use crate::segment::checksum::{Checksum, DIGEST_LEN};

use bytes::{BufMut, Bytes, BytesMut};

pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, field: &'static str, needed: usize) -> Result<&'a [u8], MalformedMessage> {
        if self.buf.len() < needed {
            return Err(MalformedMessage::Truncated {
                field,
                needed,
                remaining: self.buf.len(),
            });
        }
        let (head, rest) = self.buf.split_at(needed);
        self.buf = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], MalformedMessage> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    pub fn u8(&mut self, field: &'static str) -> Result<u8, MalformedMessage> {
        Ok(self.array::<1>(field)?[0])
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, MalformedMessage> {
        Ok(u32::from_be_bytes(self.array(field)?))
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64, MalformedMessage> {
        Ok(u64::from_be_bytes(self.array(field)?))
    }

    pub fn f64(&mut self, field: &'static str) -> Result<f64, MalformedMessage> {
        Ok(f64::from_be_bytes(self.array(field)?))
    }

    pub fn bool(&mut self, field: &'static str) -> Result<bool, MalformedMessage> {
        match self.u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MalformedMessage::InvalidValue {
                field,
                value: other as u64,
            }),
        }
    }

    pub fn request_id(&mut self) -> Result<RequestId, MalformedMessage> {
        RequestId::from_bytes(self.take("request_id", REQUEST_ID_LEN)?)
    }

    pub fn checksum(&mut self, field: &'static str) -> Result<Checksum, MalformedMessage> {
        let adler32 = self.u32(field)?;
        let digest = self.array::<DIGEST_LEN>(field)?;
        Ok(Checksum { adler32, digest })
    }

    /// u32 length prefix, then UTF-8 bytes.
    pub fn string(&mut self, field: &'static str) -> Result<String, MalformedMessage> {
        let len = self.u32(field)? as usize;
        let raw = self.take(field, len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| MalformedMessage::InvalidUtf8(field))
    }

    /// Everything left, as the message's variable tail.
    pub fn tail(&mut self) -> Bytes {
        let rest = Bytes::copy_from_slice(self.buf);
        self.buf = &[];
        rest
    }

    pub fn finish(self) -> Result<(), MalformedMessage> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(MalformedMessage::TrailingBytes(self.buf.len()))
        }
    }
}

pub fn put_request_id(buf: &mut BytesMut, request_id: &RequestId) {
    buf.put_slice(request_id.as_bytes());
}

pub fn put_checksum(buf: &mut BytesMut, checksum: &Checksum) {
    buf.put_u32(checksum.adler32);
    buf.put_slice(&checksum.digest);
}

pub fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}
