//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Invalid key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid initialization vector or nonce.
    #[error("invalid IV: {0}")]
    InvalidIv(String),

    /// Invalid ciphertext (truncated or bad padding).
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// The cipher context was already finalized.
    #[error("cipher context already finalized")]
    Finalized,

    /// Unsupported algorithm.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<aes::cipher::InvalidLength> for CryptoError {
    fn from(e: aes::cipher::InvalidLength) -> Self {
        Self::InvalidKey(e.to_string())
    }
}
