use crate::error::{MalformedMessage, Result};
use crate::messages::{Message, MessageKind};

use bytes::{BufMut, Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FRAME_HEADER_LEN: usize = 5;
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: u8,
    pub body: Bytes,
}

impl Frame {
    pub fn from_message(message: &Message) -> Self {
        Self {
            kind: message.kind().as_u8(),
            body: message.encode(),
        }
    }

    pub fn to_message(&self) -> std::result::Result<Message, MalformedMessage> {
        Message::decode(MessageKind::from_u8(self.kind)?, &self.body)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.body.len());
        buf.put_u8(self.kind);
        buf.put_u32(self.body.len() as u32);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

/// Reads one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let kind = match reader.read_u8().await {
        Ok(kind) => kind,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(MalformedMessage::FrameTooLarge(len).into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(Frame {
        kind,
        body: Bytes::from(body),
    }))
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frame.body.len() > MAX_FRAME_LEN {
        return Err(MalformedMessage::FrameTooLarge(frame.body.len()).into());
    }
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}
