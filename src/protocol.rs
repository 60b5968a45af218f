//! Client-server communication protocol definitions.
//!
//! This module defines the message types exchanged between the bucket
//! client and server, and their binary layout:
//!
//! ```text
//! ┌──────────────┬──────────┬─────────────────────────────┐
//! │ Message type │ Version  │ type specific fields        │
//! │ int32 BE     │ int32 BE │ int32 / int64 BE, raw bytes │
//! └──────────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! Fields follow the header in declaration order with no padding. The
//! message type alone determines the exact length of what follows.

use crate::error::{LoftError, Result};
use crate::identifier::{BucketId, IDENTIFIER_LEN};

/// The only layout version currently written.
pub const PROTOCOL_VERSION: i32 = 1;

/// Size of the common header in bytes.
pub const HEADER_LEN: usize = 8;

/// Error codes carried in response messages.
///
/// Generate reuses `NOT_FOUND` for "cannot create" and `TOO_LARGE` for
/// "cannot size".
pub mod error_code {
    /// Operation succeeded.
    pub const SUCCESS: i32 = 0;
    /// Bucket does not exist, or could not be created.
    pub const NOT_FOUND: i32 = 1;
    /// Size exceeds the bucket, or the bucket could not be sized.
    pub const TOO_LARGE: i32 = 2;
    /// The payload stream broke off mid-transfer.
    pub const TRANSFER_FAILED: i32 = 3;
}

/// Discriminant of every message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Reserve a new bucket.
    GenerateRequest,
    /// Upload into a bucket.
    PutRequest,
    /// Download a bucket.
    GetRequest,
    /// Answer to [`MessageType::GenerateRequest`].
    GenerateResponse,
    /// Answer to [`MessageType::PutRequest`].
    PutResponse,
    /// Answer to [`MessageType::GetRequest`].
    GetResponse,
}

impl MessageType {
    /// Wire value of this type.
    pub fn code(self) -> i32 {
        match self {
            MessageType::GenerateRequest => 1000,
            MessageType::PutRequest => 1001,
            MessageType::GetRequest => 1002,
            MessageType::GenerateResponse => 1003,
            MessageType::PutResponse => 1004,
            MessageType::GetResponse => 1005,
        }
    }

    /// Map a wire value back onto a type.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1000 => Ok(MessageType::GenerateRequest),
            1001 => Ok(MessageType::PutRequest),
            1002 => Ok(MessageType::GetRequest),
            1003 => Ok(MessageType::GenerateResponse),
            1004 => Ok(MessageType::PutResponse),
            1005 => Ok(MessageType::GetResponse),
            other => Err(LoftError::UnmappedMessageType(other)),
        }
    }

    /// Total encoded length, header included.
    pub fn encoded_len(self) -> usize {
        HEADER_LEN
            + match self {
                MessageType::GenerateRequest => 8,
                MessageType::PutRequest => IDENTIFIER_LEN + 8,
                MessageType::GetRequest => IDENTIFIER_LEN,
                MessageType::GenerateResponse => 4 + 8 + IDENTIFIER_LEN,
                MessageType::PutResponse => 4,
                MessageType::GetResponse => 4 + 8,
            }
    }
}

/// Common prefix of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Kind of the message.
    pub message_type: MessageType,
    /// Layout version; carried but not interpreted.
    pub version: i32,
}

impl Header {
    /// A header for the current protocol version.
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            version: PROTOCOL_VERSION,
        }
    }
}

/// Reserve a bucket of `num_bytes_in_bucket` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    /// Message header.
    pub header: Header,
    /// Capacity to reserve.
    pub num_bytes_in_bucket: i64,
}

/// Result of a [`GenerateRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateResponse {
    /// Message header.
    pub header: Header,
    /// Zero on success.
    pub error_code: i32,
    /// Length of `identifier`, always [`IDENTIFIER_LEN`].
    pub identifier_len: i64,
    /// Name of the new bucket.
    pub identifier: BucketId,
}

/// Announce `num_bytes` raw bytes for a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    /// Message header.
    pub header: Header,
    /// Target bucket.
    pub identifier: BucketId,
    /// Size of the payload that follows an accepting response.
    pub num_bytes: i64,
}

/// Accept or reject a [`PutRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    /// Message header.
    pub header: Header,
    /// Zero when the payload may be sent.
    pub error_code: i32,
}

/// Ask for a bucket's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    /// Message header.
    pub header: Header,
    /// Bucket to read.
    pub identifier: BucketId,
}

/// Answer to a [`GetRequest`]; `size` raw bytes follow on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    /// Message header.
    pub header: Header,
    /// Zero on success.
    pub error_code: i32,
    /// Bytes that follow, `-1` on failure.
    pub size: i64,
}

impl GenerateRequest {
    /// A request for `capacity` bytes.
    pub fn new(capacity: i64) -> Self {
        Self {
            header: Header::new(MessageType::GenerateRequest),
            num_bytes_in_bucket: capacity,
        }
    }
}

impl GenerateResponse {
    /// A response naming `identifier`.
    pub fn new(error_code: i32, identifier: BucketId) -> Self {
        Self {
            header: Header::new(MessageType::GenerateResponse),
            error_code,
            identifier_len: IDENTIFIER_LEN as i64,
            identifier,
        }
    }
}

impl PutRequest {
    /// Announce `num_bytes` for `identifier`.
    pub fn new(identifier: BucketId, num_bytes: i64) -> Self {
        Self {
            header: Header::new(MessageType::PutRequest),
            identifier,
            num_bytes,
        }
    }
}

impl PutResponse {
    /// A response carrying `error_code`.
    pub fn new(error_code: i32) -> Self {
        Self {
            header: Header::new(MessageType::PutResponse),
            error_code,
        }
    }
}

impl GetRequest {
    /// Ask for `identifier`.
    pub fn new(identifier: BucketId) -> Self {
        Self {
            header: Header::new(MessageType::GetRequest),
            identifier,
        }
    }
}

impl GetResponse {
    /// A response announcing `size` bytes.
    pub fn new(error_code: i32, size: i64) -> Self {
        Self {
            header: Header::new(MessageType::GetResponse),
            error_code,
            size,
        }
    }
}

/// Every message that can travel on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// See [`GenerateRequest`].
    GenerateRequest(GenerateRequest),
    /// See [`GenerateResponse`].
    GenerateResponse(GenerateResponse),
    /// See [`PutRequest`].
    PutRequest(PutRequest),
    /// See [`PutResponse`].
    PutResponse(PutResponse),
    /// See [`GetRequest`].
    GetRequest(GetRequest),
    /// See [`GetResponse`].
    GetResponse(GetResponse),
}

impl Message {
    /// The header of the wrapped message.
    pub fn header(&self) -> &Header {
        match self {
            Message::GenerateRequest(m) => &m.header,
            Message::GenerateResponse(m) => &m.header,
            Message::PutRequest(m) => &m.header,
            Message::PutResponse(m) => &m.header,
            Message::GetRequest(m) => &m.header,
            Message::GetResponse(m) => &m.header,
        }
    }

    /// The kind of the wrapped message, derived from the variant.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::GenerateRequest(_) => MessageType::GenerateRequest,
            Message::GenerateResponse(_) => MessageType::GenerateResponse,
            Message::PutRequest(_) => MessageType::PutRequest,
            Message::PutResponse(_) => MessageType::PutResponse,
            Message::GetRequest(_) => MessageType::GetRequest,
            Message::GetResponse(_) => MessageType::GetResponse,
        }
    }

    /// Encode to the big-endian wire layout.
    ///
    /// The type code is taken from the variant, so a header whose
    /// `message_type` disagrees with the variant cannot be written.
    pub fn encode(&self) -> Vec<u8> {
        let message_type = self.message_type();
        let mut buf = Vec::with_capacity(message_type.encoded_len());
        buf.extend_from_slice(&message_type.code().to_be_bytes());
        buf.extend_from_slice(&self.header().version.to_be_bytes());
        match self {
            Message::GenerateRequest(m) => {
                buf.extend_from_slice(&m.num_bytes_in_bucket.to_be_bytes());
            }
            Message::GenerateResponse(m) => {
                buf.extend_from_slice(&m.error_code.to_be_bytes());
                buf.extend_from_slice(&m.identifier_len.to_be_bytes());
                buf.extend_from_slice(m.identifier.as_bytes());
            }
            Message::PutRequest(m) => {
                buf.extend_from_slice(m.identifier.as_bytes());
                buf.extend_from_slice(&m.num_bytes.to_be_bytes());
            }
            Message::PutResponse(m) => {
                buf.extend_from_slice(&m.error_code.to_be_bytes());
            }
            Message::GetRequest(m) => {
                buf.extend_from_slice(m.identifier.as_bytes());
            }
            Message::GetResponse(m) => {
                buf.extend_from_slice(&m.error_code.to_be_bytes());
                buf.extend_from_slice(&m.size.to_be_bytes());
            }
        }
        buf
    }

    /// Decode one message from `buf`.
    ///
    /// Bytes past the length the message type requires are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut fields = Fields::new(buf);
        let code = fields.i32(HEADER_LEN)?;
        let message_type = MessageType::from_code(code)?;
        let expected = message_type.encoded_len();
        if buf.len() < expected {
            return Err(LoftError::TruncatedMessage {
                expected,
                actual: buf.len(),
            });
        }
        let header = Header {
            message_type,
            version: fields.i32(expected)?,
        };
        let message = match message_type {
            MessageType::GenerateRequest => Message::GenerateRequest(GenerateRequest {
                header,
                num_bytes_in_bucket: fields.i64(expected)?,
            }),
            MessageType::GenerateResponse => Message::GenerateResponse(GenerateResponse {
                header,
                error_code: fields.i32(expected)?,
                identifier_len: fields.i64(expected)?,
                identifier: fields.identifier(expected)?,
            }),
            MessageType::PutRequest => Message::PutRequest(PutRequest {
                header,
                identifier: fields.identifier(expected)?,
                num_bytes: fields.i64(expected)?,
            }),
            MessageType::PutResponse => Message::PutResponse(PutResponse {
                header,
                error_code: fields.i32(expected)?,
            }),
            MessageType::GetRequest => Message::GetRequest(GetRequest {
                header,
                identifier: fields.identifier(expected)?,
            }),
            MessageType::GetResponse => Message::GetResponse(GetResponse {
                header,
                error_code: fields.i32(expected)?,
                size: fields.i64(expected)?,
            }),
        };
        Ok(message)
    }
}

macro_rules! impl_from_message {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Message {
                fn from(m: $variant) -> Self {
                    Message::$variant(m)
                }
            }
        )*
    };
}

impl_from_message!(
    GenerateRequest,
    GenerateResponse,
    PutRequest,
    PutResponse,
    GetRequest,
    GetResponse
);

/// Sequential big-endian reader over a message body.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self, expected: usize) -> Result<[u8; N]> {
        let end = self.pos + N;
        let bytes = self
            .buf
            .get(self.pos..end)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or(LoftError::TruncatedMessage {
                expected,
                actual: self.buf.len(),
            })?;
        self.pos = end;
        Ok(bytes)
    }

    fn i32(&mut self, expected: usize) -> Result<i32> {
        self.take::<4>(expected).map(i32::from_be_bytes)
    }

    fn i64(&mut self, expected: usize) -> Result<i64> {
        self.take::<8>(expected).map(i64::from_be_bytes)
    }

    fn identifier(&mut self, expected: usize) -> Result<BucketId> {
        self.take::<IDENTIFIER_LEN>(expected)
            .map(BucketId::from_bytes)
    }
}
