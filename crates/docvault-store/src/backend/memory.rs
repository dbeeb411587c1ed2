//! In-memory content store.

use super::StorageStats;
use crate::accessor::{
    ChannelState, ContentAccessor, ContentProperties, ContentReader, ContentWriter, ReadChannel,
    TrackedReadChannel, WriteChannel,
};
use crate::error::storage_io_error;
use crate::listener::StreamListener;
use crate::store::{ContentStore, WriterContext};
use crate::url::ContentUrl;
use crate::{StorageError, StorageResult};
use bytes::{Buf, Bytes};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default protocol claimed by reference stores.
pub const DEFAULT_PROTOCOL: &str = "store";

/// In-memory content store.
pub struct InMemoryContentStore {
    name: String,
    protocol: String,
    read_only: bool,
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    data: DashMap<String, StoredContent>,
    total_size: AtomicU64,
    max_size: Option<u64>,
}

#[derive(Clone)]
struct StoredContent {
    data: Bytes,
    properties: ContentProperties,
    etag: String,
    last_modified: chrono::DateTime<chrono::Utc>,
}

impl MemoryInner {
    fn commit(&self, content_url: &str, data: Bytes, properties: ContentProperties) -> StorageResult<()> {
        let size = data.len() as u64;
        let replaced = self
            .data
            .get(content_url)
            .map_or(0, |old| old.data.len() as u64);

        if let Some(max) = self.max_size {
            let used = self.total_size.load(Ordering::SeqCst) - replaced + size;
            if used > max {
                return Err(StorageError::QuotaExceeded { used, limit: max });
            }
        }

        let stored = StoredContent {
            etag: blake3::hash(&data).to_hex().to_string(),
            last_modified: chrono::Utc::now(),
            data,
            properties,
        };
        self.data.insert(content_url.to_string(), stored);
        self.total_size.fetch_sub(replaced, Ordering::SeqCst);
        self.total_size.fetch_add(size, Ordering::SeqCst);
        Ok(())
    }
}

impl InMemoryContentStore {
    /// Creates a store claiming the default `store` protocol.
    #[must_use]
    pub fn new() -> Self {
        Self::with_protocol(DEFAULT_PROTOCOL)
    }

    /// Creates a store claiming `protocol`.
    #[must_use]
    pub fn with_protocol(protocol: impl Into<String>) -> Self {
        Self {
            name: "memory".to_string(),
            protocol: protocol.into(),
            read_only: false,
            inner: Arc::new(MemoryInner {
                data: DashMap::new(),
                total_size: AtomicU64::new(0),
                max_size: None,
            }),
        }
    }

    /// Sets the name reported in the root location.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes the store refuse writers and deletes.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Limits the total stored bytes.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.inner = Arc::new(MemoryInner {
            data: DashMap::new(),
            total_size: AtomicU64::new(0),
            max_size: Some(max_size),
        });
        self
    }

    /// Returns the protocol this store claims.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Imports content directly, bypassing writers.
    ///
    /// Works on read-only stores too; used to seed archives and fixtures.
    pub fn put(&self, content_url: &str, data: &[u8]) -> StorageResult<()> {
        self.check_supported(content_url)?;
        self.inner.commit(
            content_url,
            Bytes::copy_from_slice(data),
            ContentProperties::default(),
        )
    }

    /// Returns the blake3 etag of stored content.
    #[must_use]
    pub fn etag(&self, content_url: &str) -> Option<String> {
        self.inner.data.get(content_url).map(|c| c.etag.clone())
    }

    /// Returns when the content was last committed.
    #[must_use]
    pub fn last_modified(&self, content_url: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.inner.data.get(content_url).map(|c| c.last_modified)
    }

    /// Returns the stored bytes exactly as held.
    #[must_use]
    pub fn raw_content(&self, content_url: &str) -> Option<Bytes> {
        self.inner.data.get(content_url).map(|c| c.data.clone())
    }

    /// Clears all content.
    pub fn clear(&self) {
        self.inner.data.clear();
        self.inner.total_size.store(0, Ordering::SeqCst);
    }

    /// Returns the current total size.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.total_size.load(Ordering::SeqCst)
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    /// Returns storage statistics.
    #[must_use]
    pub fn stats(&self) -> StorageStats {
        let total_size = self.size();
        StorageStats {
            object_count: self.inner.data.len() as u64,
            total_size,
            available_space: self
                .inner
                .max_size
                .map(|max| max.saturating_sub(total_size)),
        }
    }

    fn check_supported(&self, content_url: &str) -> StorageResult<()> {
        if self.is_content_url_supported(content_url) {
            Ok(())
        } else {
            Err(StorageError::UnsupportedContentUrl {
                store: self.root_location(),
                url: content_url.to_string(),
            })
        }
    }

    fn check_writable(&self, operation: &str) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::UnsupportedOperation(format!(
                "{operation} on read-only store {}",
                self.root_location()
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn is_write_supported(&self) -> bool {
        !self.read_only
    }

    fn is_content_url_supported(&self, content_url: &str) -> bool {
        ContentUrl::has_protocol(content_url, &self.protocol)
    }

    fn get_reader(&self, content_url: &str) -> StorageResult<Option<Box<dyn ContentReader>>> {
        self.check_supported(content_url)?;
        Ok(Some(Box::new(MemoryContentReader::load(
            self.inner.clone(),
            content_url,
        ))))
    }

    fn get_writer(&self, context: &WriterContext) -> StorageResult<Box<dyn ContentWriter>> {
        self.check_writable("write")?;
        let content_url = match &context.content_url {
            Some(url) => {
                self.check_supported(url)?;
                if self.inner.data.contains_key(url) {
                    return Err(StorageError::AlreadyExists(url.clone()));
                }
                url.clone()
            }
            None => ContentUrl::generate(&self.protocol).to_string(),
        };

        let properties = ContentProperties {
            mimetype: context.mimetype.clone(),
            encoding: context.encoding.clone(),
            locale: context.locale.clone(),
        };
        Ok(Box::new(MemoryContentWriter::new(
            self.inner.clone(),
            content_url,
            properties,
        )))
    }

    fn delete(&self, content_url: &str) -> StorageResult<bool> {
        self.check_writable("delete")?;
        self.check_supported(content_url)?;
        if let Some((_, old)) = self.inner.data.remove(content_url) {
            self.inner
                .total_size
                .fetch_sub(old.data.len() as u64, Ordering::SeqCst);
        }
        Ok(true)
    }

    fn root_location(&self) -> String {
        format!("memory:{}", self.name)
    }
}

/// Reader over a snapshot of in-memory content.
pub struct MemoryContentReader {
    inner: Arc<MemoryInner>,
    content_url: String,
    data: Option<Bytes>,
    properties: ContentProperties,
    state: ChannelState,
}

impl MemoryContentReader {
    fn load(inner: Arc<MemoryInner>, content_url: &str) -> Self {
        let stored = inner.data.get(content_url).map(|c| c.value().clone());
        let (data, properties) = match stored {
            Some(c) => (Some(c.data), c.properties),
            None => (None, ContentProperties::default()),
        };
        Self {
            inner,
            content_url: content_url.to_string(),
            data,
            properties,
            state: ChannelState::new(content_url),
        }
    }
}

impl ContentAccessor for MemoryContentReader {
    fn content_url(&self) -> &str {
        &self.content_url
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.as_ref().map_or(0, |d| d.len() as u64))
    }

    fn mimetype(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.mimetype.clone())
    }

    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()> {
        self.properties.mimetype = Some(mimetype.to_string());
        Ok(())
    }

    fn encoding(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.encoding.clone())
    }

    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()> {
        self.properties.encoding = Some(encoding.to_string());
        Ok(())
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.locale.clone())
    }

    fn set_locale(&mut self, locale: &str) -> StorageResult<()> {
        self.properties.locale = Some(locale.to_string());
        Ok(())
    }

    fn is_channel_open(&self) -> StorageResult<bool> {
        Ok(self.state.is_open())
    }

    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()> {
        self.state.add_listener(listener);
        Ok(())
    }
}

impl ContentReader for MemoryContentReader {
    fn exists(&self) -> StorageResult<bool> {
        Ok(self.data.is_some())
    }

    fn channel(&mut self) -> StorageResult<ReadChannel> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| StorageError::NotFound(self.content_url.clone()))?;
        self.state.mark_opened()?;
        Ok(Box::new(TrackedReadChannel::new(
            data.reader(),
            self.state.clone(),
        )))
    }

    fn reopen(&self) -> StorageResult<Box<dyn ContentReader>> {
        Ok(Box::new(Self::load(self.inner.clone(), &self.content_url)))
    }
}

/// Writer buffering content until its channel closes.
pub struct MemoryContentWriter {
    inner: Arc<MemoryInner>,
    content_url: String,
    properties: Arc<Mutex<ContentProperties>>,
    written: Arc<AtomicU64>,
    state: ChannelState,
}

impl MemoryContentWriter {
    fn new(inner: Arc<MemoryInner>, content_url: String, properties: ContentProperties) -> Self {
        Self {
            state: ChannelState::new(content_url.clone()),
            inner,
            content_url,
            properties: Arc::new(Mutex::new(properties)),
            written: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl ContentAccessor for MemoryContentWriter {
    fn content_url(&self) -> &str {
        &self.content_url
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.written.load(Ordering::SeqCst))
    }

    fn mimetype(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.lock().mimetype.clone())
    }

    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()> {
        self.properties.lock().mimetype = Some(mimetype.to_string());
        Ok(())
    }

    fn encoding(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.lock().encoding.clone())
    }

    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()> {
        self.properties.lock().encoding = Some(encoding.to_string());
        Ok(())
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        Ok(self.properties.lock().locale.clone())
    }

    fn set_locale(&mut self, locale: &str) -> StorageResult<()> {
        self.properties.lock().locale = Some(locale.to_string());
        Ok(())
    }

    fn is_channel_open(&self) -> StorageResult<bool> {
        Ok(self.state.is_open())
    }

    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()> {
        self.state.add_listener(listener);
        Ok(())
    }
}

impl ContentWriter for MemoryContentWriter {
    fn channel(&mut self) -> StorageResult<Box<dyn WriteChannel>> {
        self.state.mark_opened()?;
        Ok(Box::new(MemoryWriteChannel {
            inner: self.inner.clone(),
            content_url: self.content_url.clone(),
            properties: self.properties.clone(),
            written: self.written.clone(),
            state: self.state.clone(),
            buffer: Vec::new(),
            closed: false,
        }))
    }

    fn is_closed(&self) -> StorageResult<bool> {
        Ok(self.state.is_closed())
    }

    fn get_reader(&self) -> StorageResult<Box<dyn ContentReader>> {
        Ok(Box::new(MemoryContentReader::load(
            self.inner.clone(),
            &self.content_url,
        )))
    }
}

struct MemoryWriteChannel {
    inner: Arc<MemoryInner>,
    content_url: String,
    properties: Arc<Mutex<ContentProperties>>,
    written: Arc<AtomicU64>,
    state: ChannelState,
    buffer: Vec<u8>,
    closed: bool,
}

impl Write for MemoryWriteChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel is closed"));
        }
        self.buffer.extend_from_slice(buf);
        self.written.fetch_add(buf.len() as u64, Ordering::SeqCst);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteChannel for MemoryWriteChannel {
    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let data = Bytes::from(std::mem::take(&mut self.buffer));
        let properties = self.properties.lock().clone();
        if let Err(e) = self.inner.commit(&self.content_url, data, properties) {
            self.state.mark_abandoned();
            return Err(storage_io_error(e));
        }
        self.state.mark_closed().map_err(storage_io_error)
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

impl Drop for MemoryWriteChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(url = %self.content_url, error = %e, "Closing memory channel on drop failed");
        }
    }
}
