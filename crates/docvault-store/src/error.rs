//! Storage error types.

use docvault_crypto::CryptoError;
use thiserror::Error;

/// Storage result type.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Content not found.
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Content already exists.
    #[error("Content already exists: {0}")]
    AlreadyExists(String),

    /// Malformed content URL.
    #[error("Invalid content URL: {0}")]
    InvalidUrl(String),

    /// The store does not handle this content URL.
    #[error("Content URL not supported by store '{store}': {url}")]
    UnsupportedContentUrl {
        /// Root location of the refusing store.
        store: String,
        /// The refused URL.
        url: String,
    },

    /// The store does not allow this operation.
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    /// An accessor channel was requested twice.
    #[error("Channel already opened for content: {0}")]
    ChannelAlreadyOpened(String),

    /// A lazily created delegate could not be produced.
    #[error("Delegate unavailable: {0}")]
    DelegateUnavailable(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Quota exceeded.
    #[error("Storage quota exceeded: {used} / {limit}")]
    QuotaExceeded {
        /// Bytes the write would have brought the store to.
        used: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Internal error.
    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl From<CryptoError> for StorageError {
    fn from(e: CryptoError) -> Self {
        Self::Encryption(e.to_string())
    }
}

impl From<config::ConfigError> for StorageError {
    fn from(e: config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Reclassifies a cipher failure as a stream IO failure.
pub(crate) fn cipher_io_error(e: CryptoError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

/// Converts a storage failure surfacing inside a byte channel.
pub(crate) fn storage_io_error(e: StorageError) -> std::io::Error {
    match e {
        StorageError::Io(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::Other, other),
    }
}
