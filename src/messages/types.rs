use crate::error::MalformedMessage;
use std::fmt;
use std::num::NonZeroU8;
use uuid::Uuid;

pub const REQUEST_ID_LEN: usize = 32;

/// 32 lowercase hex characters identifying one segment's exchange.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId([u8; REQUEST_ID_LEN]);

impl RequestId {
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    pub fn from_u128(value: u128) -> Self {
        Self::from_uuid(Uuid::from_u128(value))
    }

    fn from_uuid(uuid: Uuid) -> Self {
        let mut bytes = [0u8; REQUEST_ID_LEN];
        uuid.simple().encode_lower(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MalformedMessage> {
        let bytes: [u8; REQUEST_ID_LEN] = bytes
            .try_into()
            .map_err(|_| MalformedMessage::InvalidRequestId)?;
        if !bytes.iter().all(u8::is_ascii_hexdigit) {
            return Err(MalformedMessage::InvalidRequestId);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; REQUEST_ID_LEN] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    ArchiveKeyEntire = 1,
    ArchiveKeyStart = 2,
    ArchiveKeyNext = 3,
    ArchiveKeyFinal = 4,
    ArchiveKeyStartReply = 5,
    ArchiveKeyNextReply = 6,
    ArchiveKeyFinalReply = 7,
    RetrieveKeyStart = 8,
    RetrieveKeyStartReply = 9,
    RetrieveKeyNext = 10,
    RetrieveKeyNextReply = 11,
    DestroyKey = 12,
    DestroyKeyReply = 13,
    AntiEntropyAudit = 14,
    AntiEntropyAuditReply = 15,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Result<Self, MalformedMessage> {
        use MessageKind::*;
        Ok(match value {
            1 => ArchiveKeyEntire,
            2 => ArchiveKeyStart,
            3 => ArchiveKeyNext,
            4 => ArchiveKeyFinal,
            5 => ArchiveKeyStartReply,
            6 => ArchiveKeyNextReply,
            7 => ArchiveKeyFinalReply,
            8 => RetrieveKeyStart,
            9 => RetrieveKeyStartReply,
            10 => RetrieveKeyNext,
            11 => RetrieveKeyNextReply,
            12 => DestroyKey,
            13 => DestroyKeyReply,
            14 => AntiEntropyAudit,
            15 => AntiEntropyAuditReply,
            other => return Err(MalformedMessage::UnknownKind(other)),
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The reply a storage node answers this request with.
    pub fn reply_kind(self) -> Option<MessageKind> {
        use MessageKind::*;
        match self {
            ArchiveKeyEntire | ArchiveKeyFinal => Some(ArchiveKeyFinalReply),
            ArchiveKeyStart => Some(ArchiveKeyStartReply),
            ArchiveKeyNext => Some(ArchiveKeyNextReply),
            RetrieveKeyStart => Some(RetrieveKeyStartReply),
            RetrieveKeyNext => Some(RetrieveKeyNextReply),
            DestroyKey => Some(DestroyKeyReply),
            AntiEntropyAudit => Some(AntiEntropyAuditReply),
            _ => None,
        }
    }

    pub fn is_reply(self) -> bool {
        self.reply_kind().is_none()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A non-success reply: the code and the node's error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyError {
    pub code: NonZeroU8,
    pub message: String,
}

impl ReplyError {
    pub fn new(code: NonZeroU8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

macro_rules! error_codes {
    ($name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn code(self) -> NonZeroU8 {
                match self {
                    $($name::$variant => NonZeroU8::MIN.saturating_add($value - 1)),+
                }
            }

            pub fn from_code(code: NonZeroU8) -> Option<Self> {
                match code.get() {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn reply(self, message: impl Into<String>) -> ReplyError {
                ReplyError::new(self.code(), message)
            }
        }
    };
}

error_codes!(RetrieveErrorCode {
    KeyNotFound = 1,
    Exception = 2,
    Database = 3,
    InvalidDuplicate = 4,
    TimeoutWaitingKeyInsert = 5,
});

error_codes!(AuditErrorCode {
    AuditError = 1,
    OtherError = 2,
});

// Codes a storage node uses to refuse an archive or destroy step.
error_codes!(ArchiveErrorCode {
    Exception = 1,
    OutOfSequence = 2,
    ChecksumMismatch = 3,
    UnknownRequest = 4,
});
