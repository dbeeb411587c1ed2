//! Content stores for docvault.
//!
//! This crate provides streaming content accessors over pluggable stores,
//! an aggregating store that falls back across a primary and ordered
//! secondaries, and encrypt-on-write / decrypt-on-read wrappers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accessor;
pub mod aggregate;
pub mod backend;
pub mod config;
pub mod decrypt;
pub mod encrypt;
pub mod encrypted;
pub mod error;
pub mod facade;
pub mod listener;
pub mod store;
pub mod url;

pub use accessor::{
    ChannelState, ContentAccessor, ContentData, ContentProperties, ContentReader, ContentWriter,
    ReadChannel, TrackedReadChannel, WriteChannel,
};
pub use aggregate::{AggregatingContentStore, AggregatingContentStoreBuilder};
pub use backend::{FileContentStore, InMemoryContentStore, StorageStats};
pub use config::{AggregatingStoreConfig, DocVaultConfig, EncryptionConfig, StoreRegistry};
pub use decrypt::{DecryptingContentReader, DecryptingReadChannel};
pub use encrypt::{EncryptingContentWriter, EncryptingWriteChannel, EncryptionTotals};
pub use encrypted::EncryptingContentStore;
pub use error::{StorageError, StorageResult};
pub use facade::{ContentReaderFacade, ContentWriterFacade, LazyDelegate};
pub use listener::{EncryptionListener, Listeners, StreamListener};
pub use store::{ContentStore, WriterContext};
pub use url::ContentUrl;

// Re-export the key types callers need to construct encrypting stores.
pub use docvault_crypto::{KeyAlgorithm, SymmetricKey};
