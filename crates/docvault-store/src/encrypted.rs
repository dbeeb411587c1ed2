//! Store wrapper that encrypts content at rest.
//!
//! Every writer handed out encrypts what is written through it; every reader
//! decrypts. The plaintext size of each item is recorded when its writer's
//! channel closes and is carried by the readers, since the stored ciphertext
//! length includes padding.
//!
//! Size records live in memory only. Content encrypted by an earlier process
//! is unreadable until its size is replayed through
//! [`EncryptingContentStore::record_plaintext_size`].

use crate::accessor::{ContentAccessor, ContentReader, ContentWriter};
use crate::decrypt::DecryptingContentReader;
use crate::encrypt::EncryptingContentWriter;
use crate::store::{ContentStore, WriterContext};
use crate::{StorageError, StorageResult};
use dashmap::DashMap;
use docvault_crypto::{CipherContext, SymmetricKey};
use std::sync::Arc;
use tracing::debug;

/// Encrypting wrapper around any [`ContentStore`].
pub struct EncryptingContentStore {
    inner: Arc<dyn ContentStore>,
    key: Arc<SymmetricKey>,
    sizes: Arc<DashMap<String, u64>>,
}

impl EncryptingContentStore {
    /// Wraps `inner`. Fails if the cipher cannot be set up for `key`.
    pub fn new(inner: Arc<dyn ContentStore>, key: SymmetricKey) -> StorageResult<Self> {
        CipherContext::encryptor(&key)
            .map_err(|e| StorageError::Configuration(format!("cipher setup failed: {e}")))?;
        Ok(Self {
            inner,
            key: Arc::new(key),
            sizes: Arc::new(DashMap::new()),
        })
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn ContentStore> {
        &self.inner
    }

    /// Records the plaintext size of content encrypted elsewhere.
    pub fn record_plaintext_size(&self, content_url: impl Into<String>, size: u64) {
        self.sizes.insert(content_url.into(), size);
    }

    /// Returns the recorded plaintext size, if any.
    #[must_use]
    pub fn plaintext_size(&self, content_url: &str) -> Option<u64> {
        self.sizes.get(content_url).map(|size| *size)
    }
}

impl ContentStore for EncryptingContentStore {
    fn is_write_supported(&self) -> bool {
        self.inner.is_write_supported()
    }

    fn is_content_url_supported(&self, content_url: &str) -> bool {
        self.inner.is_content_url_supported(content_url)
    }

    fn get_reader(&self, content_url: &str) -> StorageResult<Option<Box<dyn ContentReader>>> {
        let Some(reader) = self.inner.get_reader(content_url)? else {
            return Ok(None);
        };

        let plaintext_size = if reader.exists()? {
            self.plaintext_size(content_url).ok_or_else(|| {
                StorageError::Encryption(format!("no plaintext size recorded for {content_url}"))
            })?
        } else {
            0
        };

        let reader = DecryptingContentReader::new(reader, self.key.clone(), plaintext_size)?
            .with_source(self.inner.clone());
        Ok(Some(Box::new(reader)))
    }

    fn get_writer(&self, context: &WriterContext) -> StorageResult<Box<dyn ContentWriter>> {
        let delegate = self.inner.get_writer(context)?;
        let mut writer = EncryptingContentWriter::new(delegate, self.key.clone())?;

        let totals = writer.totals();
        let sizes = self.sizes.clone();
        writer.add_listener(Arc::new(move |content_url: &str| -> StorageResult<()> {
            let size = totals.plain_bytes();
            debug!(url = content_url, size, "Recording plaintext size");
            sizes.insert(content_url.to_string(), size);
            Ok(())
        }))?;

        Ok(Box::new(writer))
    }

    fn delete(&self, content_url: &str) -> StorageResult<bool> {
        let deleted = self.inner.delete(content_url)?;
        if deleted {
            self.sizes.remove(content_url);
        }
        Ok(deleted)
    }

    fn root_location(&self) -> String {
        self.inner.root_location()
    }
}

impl std::fmt::Debug for EncryptingContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptingContentStore")
            .field("inner", &self.inner.root_location())
            .field("algorithm", &self.key.algorithm())
            .field("records", &self.sizes.len())
            .finish()
    }
}
