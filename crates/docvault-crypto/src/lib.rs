//! # Docvault Crypto
//!
//! Symmetric cryptography for docvault content stores:
//! - Zeroizing key material
//! - AES-CBC/PKCS#7 and ChaCha20 streaming cipher contexts
//! - Deterministic cipher selection by key algorithm

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cipher;
pub mod error;
pub mod key;

pub use cipher::*;
pub use error::*;
pub use key::*;
