//! Error types for the ledger

use crate::types::{DocumentHash, Identity, Role};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every variant is terminal for the call that produced it. Failures are
/// detected before any write, so an error never leaves partial state.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the capability required by the operation
    #[error("Unauthorized: {caller} lacks {required} role")]
    Unauthorized {
        /// Rejected caller
        caller: Identity,
        /// Capability the operation needs
        required: Role,
    },

    /// Hash already has a record (revoked or not)
    #[error("Document already issued: {0}")]
    AlreadyIssued(DocumentHash),

    /// Hash has no record
    #[error("Document not found: {0}")]
    NotFound(DocumentHash),

    /// Malformed argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Signed command did not verify
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Persisted state does not match its own hashes or counters
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Concurrency error (writer mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat classification of [`Error`] for matching and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Unauthorized`]
    Unauthorized,
    /// See [`Error::AlreadyIssued`]
    AlreadyIssued,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::InvalidInput`]
    InvalidInput,
    /// See [`Error::Signature`]
    Signature,
    /// Storage, serialization, corruption and IO failures
    Internal,
    /// See [`Error::Concurrency`]
    Concurrency,
    /// See [`Error::Config`]
    Config,
}

impl ErrorKind {
    /// Stable snake_case label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::AlreadyIssued => "already_issued",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Signature => "signature",
            ErrorKind::Internal => "internal",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::Config => "config",
        }
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::AlreadyIssued(_) => ErrorKind::AlreadyIssued,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Signature(_) => ErrorKind::Signature,
            Error::Storage(_) | Error::Serialization(_) | Error::Corruption(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
            Error::Concurrency(_) => ErrorKind::Concurrency,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// True for rejections caused by the request rather than the ledger
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Unauthorized
                | ErrorKind::AlreadyIssued
                | ErrorKind::NotFound
                | ErrorKind::InvalidInput
                | ErrorKind::Signature
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
