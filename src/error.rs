//! Error
//!
//! This module provides the errors needed in [`crate::server::LoftServer`],
//! [`crate::client::LoftClient`] and the bucket engines, with [`thiserror`]
//!
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::identifier::BucketId;
use crate::protocol::{MessageType, error_code};

/// Result use the [`LoftError`] as error.
pub type Result<T> = std::result::Result<T, LoftError>;

/// LoftError is the specific error for the bucket store and its wire protocol.
#[derive(Error, Debug)]
pub enum LoftError {
    #[error("io error {0}")]
    /// IO relevant errors
    IOError(#[from] io::Error),

    /// The leading message type is not one of the six known kinds
    #[error("unmapped message type {0}")]
    UnmappedMessageType(i32),

    /// Fewer bytes than the declared message type requires
    #[error("truncated message: expected {expected} bytes, got {actual}")]
    TruncatedMessage {
        /// Bytes the message type requires.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// An encoded message does not fit the one byte length prefix
    #[error("encoded message of {0} bytes does not fit in a frame")]
    FrameTooLarge(usize),

    /// A well-formed message arrived where a different kind was required
    #[error("unexpected message {0:?}")]
    UnexpectedMessage(MessageType),

    /// A bucket identifier that is not six ascii alphanumerics
    #[error("invalid bucket identifier {0:?}")]
    InvalidIdentifier(String),

    /// The peer answered with a non-zero error code
    #[error("{operation} rejected with error code {code}")]
    Rejected {
        /// The operation that was refused.
        operation: &'static str,
        /// The wire error code.
        code: i32,
    },

    /// Bucket engine failures
    #[error("bucket error: {0}")]
    Bucket(#[from] BucketError),

    /// TLS setup or session errors
    #[error("tls error {0}")]
    Tls(#[from] rustls::Error),

    /// PEM certificate or key could not be read
    #[error("pem error {0}")]
    Pem(#[from] rustls::pki_types::pem::Error),

    /// A TLS server name that is not a valid dns name or ip address
    #[error("invalid tls server name {0}")]
    InvalidServerName(String),

    /// Configuration file errors
    #[error("config error {0}")]
    Config(#[from] toml::de::Error),

    /// The configured bucket directory is unusable
    #[error("bucket path {0} is not a directory")]
    InvalidBucketPath(PathBuf),
}

/// BucketError is the failure of a single bucket operation.
///
/// Every variant maps onto the `ErrorCode` carried back to the client.
#[derive(Error, Debug)]
pub enum BucketError {
    /// No bucket exists under the identifier
    #[error("bucket {0} does not exist")]
    NotFound(BucketId),

    /// The bucket file could not be created
    #[error("cannot create bucket file: {0}")]
    CreateFailed(io::Error),

    /// The bucket file could not be sized to its capacity
    #[error("cannot size bucket file: {0}")]
    AllocateFailed(io::Error),

    /// A negative capacity or payload size
    #[error("invalid size {0}")]
    InvalidSize(i64),

    /// The upload is larger than the bucket
    #[error("{requested} bytes exceed bucket capacity of {capacity}")]
    CapacityExceeded {
        /// Declared upload size.
        requested: i64,
        /// Current bucket size.
        capacity: i64,
    },

    /// The bucket could not be inspected or opened
    #[error("cannot access bucket: {0}")]
    Storage(io::Error),

    /// The payload stream failed mid-transfer; the partial bucket was removed
    #[error("transfer aborted: {0}")]
    TransferFailed(io::Error),
}

impl BucketError {
    /// The `ErrorCode` reported to the peer for this failure.
    pub fn error_code(&self) -> i32 {
        match self {
            BucketError::NotFound(_) | BucketError::CreateFailed(_) | BucketError::Storage(_) => {
                error_code::NOT_FOUND
            }
            BucketError::AllocateFailed(_)
            | BucketError::InvalidSize(_)
            | BucketError::CapacityExceeded { .. } => error_code::TOO_LARGE,
            BucketError::TransferFailed(_) => error_code::TRANSFER_FAILED,
        }
    }
}
