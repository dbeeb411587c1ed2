//! Secure key types with zeroization.

use crate::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secure bytes that are zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    /// Creates new secure bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Creates secure bytes from a slice.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    /// Returns the bytes as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED, {} bytes])", self.0.len())
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Symmetric key algorithm.
///
/// The algorithm decides the cipher transformation: block ciphers run in
/// CBC mode with PKCS#7 padding, stream ciphers are applied directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// AES with a 128-bit key.
    #[serde(rename = "AES-128")]
    Aes128,
    /// AES with a 256-bit key.
    #[serde(rename = "AES-256")]
    Aes256,
    /// ChaCha20 stream cipher.
    #[serde(rename = "CHACHA20")]
    ChaCha20,
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        Self::Aes256
    }
}

impl KeyAlgorithm {
    /// Returns the key size in bytes.
    #[must_use]
    pub const fn key_size(&self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes256 | Self::ChaCha20 => 32,
        }
    }

    /// Returns the cipher block size in bytes, zero for stream ciphers.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        match self {
            Self::Aes128 | Self::Aes256 => 16,
            Self::ChaCha20 => 0,
        }
    }

    /// Returns true for pure stream ciphers.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        self.block_size() == 0
    }

    /// Returns the IV (or nonce) size in bytes.
    #[must_use]
    pub const fn iv_size(&self) -> usize {
        match self {
            Self::Aes128 | Self::Aes256 => 16,
            Self::ChaCha20 => 12,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aes128 => write!(f, "AES-128"),
            Self::Aes256 => write!(f, "AES-256"),
            Self::ChaCha20 => write!(f, "CHACHA20"),
        }
    }
}

impl std::str::FromStr for KeyAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('_', "-").as_str() {
            "AES-128" | "AES128" => Ok(Self::Aes128),
            "AES-256" | "AES256" | "AES" => Ok(Self::Aes256),
            "CHACHA20" => Ok(Self::ChaCha20),
            _ => Err(CryptoError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// A symmetric key handed to the cipher layer.
///
/// Where the key comes from (keystore, KMS, configuration) is the caller's
/// concern; this type only carries validated material and its algorithm.
#[derive(Clone)]
pub struct SymmetricKey {
    algorithm: KeyAlgorithm,
    material: SecureBytes,
}

impl SymmetricKey {
    /// Creates a key, validating the material length against the algorithm.
    pub fn new(algorithm: KeyAlgorithm, material: SecureBytes) -> CryptoResult<Self> {
        if material.len() != algorithm.key_size() {
            return Err(CryptoError::InvalidKey(format!(
                "{} expects {} bytes, got {}",
                algorithm,
                algorithm.key_size(),
                material.len()
            )));
        }
        Ok(Self {
            algorithm,
            material,
        })
    }

    /// Generates a new random key.
    #[must_use]
    pub fn generate(algorithm: KeyAlgorithm) -> Self {
        let mut material = vec![0u8; algorithm.key_size()];
        rand::thread_rng().fill_bytes(&mut material);
        Self {
            algorithm,
            material: SecureBytes::new(material),
        }
    }

    /// Decodes base64 key material.
    pub fn from_base64(algorithm: KeyAlgorithm, encoded: &str) -> CryptoResult<Self> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::new(algorithm, SecureBytes::new(decoded))
    }

    /// Returns the key algorithm.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Returns the raw key material.
    #[must_use]
    pub fn material(&self) -> &SecureBytes {
        &self.material
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .field("material", &"[REDACTED]")
            .finish()
    }
}
