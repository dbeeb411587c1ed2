//! Streaming cipher contexts.
//!
//! A [`CipherContext`] transforms a byte stream incrementally. The
//! transformation is chosen from the key algorithm:
//!
//! - stream ciphers (block size zero) are applied directly, without padding;
//! - block ciphers run in CBC mode with PKCS#7 padding.
//!
//! Both use a fixed all-zero IV (or nonce). Ciphertext produced by earlier
//! releases depends on it, so the same key always yields the same
//! ciphertext for the same plaintext.

use crate::{CryptoError, CryptoResult, KeyAlgorithm, SymmetricKey};
use aes::{Aes128, Aes256};
use cbc::cipher::{
    generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher,
};
use chacha20::ChaCha20;
use zeroize::Zeroize;

/// Block size of the CBC transformations.
pub const CBC_BLOCK_SIZE: usize = 16;

const ZERO_IV: [u8; 16] = [0u8; 16];
const ZERO_NONCE: [u8; 12] = [0u8; 12];

/// Direction of a cipher context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherDirection {
    /// Plaintext in, ciphertext out.
    Encrypt,
    /// Ciphertext in, plaintext out.
    Decrypt,
}

enum CbcEncryptor {
    Aes128(cbc::Encryptor<Aes128>),
    Aes256(cbc::Encryptor<Aes256>),
}

impl CbcEncryptor {
    fn encrypt_blocks(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(CBC_BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(block);
            match self {
                Self::Aes128(c) => c.encrypt_block_mut(block),
                Self::Aes256(c) => c.encrypt_block_mut(block),
            }
        }
    }
}

enum CbcDecryptor {
    Aes128(cbc::Decryptor<Aes128>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl CbcDecryptor {
    fn decrypt_blocks(&mut self, data: &mut [u8]) {
        for block in data.chunks_exact_mut(CBC_BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(block);
            match self {
                Self::Aes128(c) => c.decrypt_block_mut(block),
                Self::Aes256(c) => c.decrypt_block_mut(block),
            }
        }
    }
}

enum Transformation {
    Stream(Box<ChaCha20>),
    CbcEncrypt(CbcEncryptor),
    CbcDecrypt(CbcDecryptor),
}

/// Incremental cipher state bound to one key and one direction.
pub struct CipherContext {
    algorithm: KeyAlgorithm,
    direction: CipherDirection,
    transformation: Transformation,
    /// Input not yet emitted: a partial block, or on decrypt the held-back
    /// final block.
    pending: Vec<u8>,
    finalized: bool,
}

impl CipherContext {
    /// Creates an encrypting context.
    pub fn encryptor(key: &SymmetricKey) -> CryptoResult<Self> {
        Self::new(key, CipherDirection::Encrypt)
    }

    /// Creates a decrypting context.
    pub fn decryptor(key: &SymmetricKey) -> CryptoResult<Self> {
        Self::new(key, CipherDirection::Decrypt)
    }

    /// Creates a context for the given direction.
    pub fn new(key: &SymmetricKey, direction: CipherDirection) -> CryptoResult<Self> {
        let material = key.material().as_slice();
        let transformation = match (key.algorithm(), direction) {
            (KeyAlgorithm::ChaCha20, _) => {
                Transformation::Stream(Box::new(ChaCha20::new_from_slices(material, &ZERO_NONCE)?))
            }
            (KeyAlgorithm::Aes128, CipherDirection::Encrypt) => Transformation::CbcEncrypt(
                CbcEncryptor::Aes128(cbc::Encryptor::new_from_slices(material, &ZERO_IV)?),
            ),
            (KeyAlgorithm::Aes256, CipherDirection::Encrypt) => Transformation::CbcEncrypt(
                CbcEncryptor::Aes256(cbc::Encryptor::new_from_slices(material, &ZERO_IV)?),
            ),
            (KeyAlgorithm::Aes128, CipherDirection::Decrypt) => Transformation::CbcDecrypt(
                CbcDecryptor::Aes128(cbc::Decryptor::new_from_slices(material, &ZERO_IV)?),
            ),
            (KeyAlgorithm::Aes256, CipherDirection::Decrypt) => Transformation::CbcDecrypt(
                CbcDecryptor::Aes256(cbc::Decryptor::new_from_slices(material, &ZERO_IV)?),
            ),
        };

        Ok(Self {
            algorithm: key.algorithm(),
            direction,
            transformation,
            pending: Vec::with_capacity(CBC_BLOCK_SIZE * 2),
            finalized: false,
        })
    }

    /// Returns the key algorithm.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Returns the direction.
    #[must_use]
    pub fn direction(&self) -> CipherDirection {
        self.direction
    }

    /// Returns the block size, zero for stream ciphers.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.algorithm.block_size()
    }

    /// Returns true once [`finalize`](Self::finalize) has run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Worst-case number of bytes [`update`](Self::update) appends for
    /// `input_len` more input bytes.
    #[must_use]
    pub fn output_size(&self, input_len: usize) -> usize {
        match self.transformation {
            Transformation::Stream(_) => input_len,
            Transformation::CbcEncrypt(_) | Transformation::CbcDecrypt(_) => {
                (self.pending.len() + input_len) / CBC_BLOCK_SIZE * CBC_BLOCK_SIZE
            }
        }
    }

    /// Worst-case number of bytes [`finalize`](Self::finalize) appends.
    #[must_use]
    pub fn final_size(&self) -> usize {
        match self.transformation {
            Transformation::Stream(_) => 0,
            Transformation::CbcEncrypt(_) | Transformation::CbcDecrypt(_) => CBC_BLOCK_SIZE,
        }
    }

    /// Feeds `input` through the cipher, appending output to `out`.
    ///
    /// Returns the number of bytes appended.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> CryptoResult<usize> {
        if self.finalized {
            return Err(CryptoError::Finalized);
        }

        let start = out.len();
        match &mut self.transformation {
            Transformation::Stream(cipher) => {
                out.extend_from_slice(input);
                cipher.apply_keystream(&mut out[start..]);
            }
            Transformation::CbcEncrypt(cipher) => {
                self.pending.extend_from_slice(input);
                let ready = self.pending.len() / CBC_BLOCK_SIZE * CBC_BLOCK_SIZE;
                out.extend_from_slice(&self.pending[..ready]);
                self.pending.drain(..ready);
                cipher.encrypt_blocks(&mut out[start..]);
            }
            Transformation::CbcDecrypt(cipher) => {
                self.pending.extend_from_slice(input);
                let total = self.pending.len();
                // The last complete block may carry padding; keep it back.
                let ready = if total % CBC_BLOCK_SIZE == 0 {
                    total.saturating_sub(CBC_BLOCK_SIZE)
                } else {
                    total - total % CBC_BLOCK_SIZE
                };
                out.extend_from_slice(&self.pending[..ready]);
                self.pending.drain(..ready);
                cipher.decrypt_blocks(&mut out[start..]);
            }
        }
        Ok(out.len() - start)
    }

    /// Completes the transformation, appending any final bytes to `out`.
    ///
    /// Encrypting block ciphers emit the padded final block (a whole block
    /// of padding when the input length is a multiple of the block size).
    /// Decrypting block ciphers validate and strip the padding.
    pub fn finalize(&mut self, out: &mut Vec<u8>) -> CryptoResult<usize> {
        if self.finalized {
            return Err(CryptoError::Finalized);
        }
        self.finalized = true;

        let start = out.len();
        let result = match &mut self.transformation {
            Transformation::Stream(_) => Ok(0),
            Transformation::CbcEncrypt(cipher) => {
                let pad = CBC_BLOCK_SIZE - self.pending.len();
                out.extend_from_slice(&self.pending);
                out.resize(start + CBC_BLOCK_SIZE, pad as u8);
                cipher.encrypt_blocks(&mut out[start..]);
                Ok(CBC_BLOCK_SIZE)
            }
            Transformation::CbcDecrypt(cipher) => {
                if self.pending.len() != CBC_BLOCK_SIZE {
                    Err(CryptoError::InvalidCiphertext(format!(
                        "ciphertext length is not a positive multiple of {CBC_BLOCK_SIZE} ({} trailing bytes)",
                        self.pending.len()
                    )))
                } else {
                    let mut block = [0u8; CBC_BLOCK_SIZE];
                    block.copy_from_slice(&self.pending);
                    cipher.decrypt_blocks(&mut block);
                    let result = strip_padding(&block).map(|plain| {
                        out.extend_from_slice(plain);
                        plain.len()
                    });
                    block.zeroize();
                    result
                }
            }
        };
        self.pending.zeroize();
        result
    }
}

impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext")
            .field("algorithm", &self.algorithm)
            .field("direction", &self.direction)
            .field("pending", &self.pending.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

fn strip_padding(block: &[u8; CBC_BLOCK_SIZE]) -> CryptoResult<&[u8]> {
    let pad = block[CBC_BLOCK_SIZE - 1] as usize;
    if pad == 0 || pad > CBC_BLOCK_SIZE {
        return Err(CryptoError::InvalidCiphertext("bad padding".to_string()));
    }
    let (plain, padding) = block.split_at(CBC_BLOCK_SIZE - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(CryptoError::InvalidCiphertext("bad padding".to_string()));
    }
    Ok(plain)
}
