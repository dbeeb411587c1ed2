//! Streaming content accessors.
//!
//! A content accessor is a single-use handle bound to one content URL. A
//! reader hands out one [`ReadChannel`], a writer one [`WriteChannel`]; once
//! that channel is closed the accessor is spent and a fresh one must be
//! obtained from the store (or via [`ContentReader::reopen`]).

use crate::listener::{Listeners, StreamListener};
use crate::{StorageError, StorageResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Byte channel handed out by a reader.
pub type ReadChannel = Box<dyn Read + Send>;

/// Metadata snapshot of one accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentData {
    /// Content URL.
    pub content_url: String,
    /// Logical size in bytes.
    pub size: u64,
    /// Content type (MIME).
    pub mimetype: Option<String>,
    /// Character encoding.
    pub encoding: Option<String>,
    /// Locale tag, e.g. `en_GB`.
    pub locale: Option<String>,
}

/// Descriptive properties stored alongside content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentProperties {
    /// Content type (MIME).
    pub mimetype: Option<String>,
    /// Character encoding.
    pub encoding: Option<String>,
    /// Locale tag.
    pub locale: Option<String>,
}

/// Operations shared by readers and writers.
pub trait ContentAccessor: Send {
    /// Returns the content URL this accessor is bound to.
    fn content_url(&self) -> &str;

    /// Returns the logical size of the content in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Returns the content type.
    fn mimetype(&self) -> StorageResult<Option<String>>;

    /// Sets the content type.
    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()>;

    /// Returns the character encoding.
    fn encoding(&self) -> StorageResult<Option<String>>;

    /// Sets the character encoding.
    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()>;

    /// Returns the locale.
    fn locale(&self) -> StorageResult<Option<String>>;

    /// Sets the locale.
    fn set_locale(&mut self, locale: &str) -> StorageResult<()>;

    /// Returns true while the channel is handed out and not yet closed.
    fn is_channel_open(&self) -> StorageResult<bool>;

    /// Registers a listener told when the channel closes.
    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()>;

    /// Returns a metadata snapshot.
    fn content_data(&self) -> StorageResult<ContentData> {
        Ok(ContentData {
            content_url: self.content_url().to_string(),
            size: self.size()?,
            mimetype: self.mimetype()?,
            encoding: self.encoding()?,
            locale: self.locale()?,
        })
    }
}

/// Read side of a content accessor.
pub trait ContentReader: ContentAccessor {
    /// Returns true if the content exists in the store.
    fn exists(&self) -> StorageResult<bool>;

    /// Opens the read channel. May be called once per reader.
    fn channel(&mut self) -> StorageResult<ReadChannel>;

    /// Returns a fresh reader for the same content.
    fn reopen(&self) -> StorageResult<Box<dyn ContentReader>>;

    /// Reads the whole content into memory.
    fn content_as_bytes(&mut self) -> StorageResult<Vec<u8>> {
        let mut channel = self.channel()?;
        let mut data = Vec::new();
        channel.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Write side of a content accessor.
pub trait ContentWriter: ContentAccessor {
    /// Opens the write channel. May be called once per writer.
    fn channel(&mut self) -> StorageResult<Box<dyn WriteChannel>>;

    /// Returns true once the write channel has been closed.
    fn is_closed(&self) -> StorageResult<bool>;

    /// Returns a reader for the content this writer produced.
    fn get_reader(&self) -> StorageResult<Box<dyn ContentReader>>;

    /// Writes `data` through a fresh channel and closes it.
    fn put_content(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut channel = self.channel()?;
        channel.write_all(data)?;
        channel.close()?;
        Ok(())
    }
}

/// Byte sink handed out by a writer.
///
/// Closing is explicit so errors surface; dropping an open channel closes it
/// and logs any failure.
pub trait WriteChannel: Write + Send {
    /// Flushes and releases the channel. A second call is a no-op.
    fn close(&mut self) -> io::Result<()>;

    /// Returns true until [`close`](Self::close) has run.
    fn is_open(&self) -> bool;
}

impl<W: WriteChannel + ?Sized> WriteChannel for Box<W> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Open/closed bookkeeping shared between an accessor and its channel.
#[derive(Clone)]
pub struct ChannelState {
    inner: Arc<ChannelStateInner>,
}

struct ChannelStateInner {
    content_url: String,
    opened: AtomicBool,
    closed: AtomicBool,
    listeners: Mutex<Listeners<dyn StreamListener>>,
}

impl ChannelState {
    /// Creates state for a not-yet-opened channel.
    #[must_use]
    pub fn new(content_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ChannelStateInner {
                content_url: content_url.into(),
                opened: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                listeners: Mutex::new(Listeners::new()),
            }),
        }
    }

    /// Returns the content URL.
    #[must_use]
    pub fn content_url(&self) -> &str {
        &self.inner.content_url
    }

    /// Marks the channel as handed out; fails on a second call.
    pub fn mark_opened(&self) -> StorageResult<()> {
        if self.inner.opened.swap(true, Ordering::SeqCst) {
            return Err(StorageError::ChannelAlreadyOpened(
                self.inner.content_url.clone(),
            ));
        }
        Ok(())
    }

    /// Marks the channel closed and notifies listeners, once.
    pub fn mark_closed(&self) -> StorageResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let listeners = self.inner.listeners.lock().clone();
        listeners.notify_closed(&self.inner.content_url)
    }

    /// Marks the channel closed without notifying listeners.
    ///
    /// Used when the content behind the channel never made it to the store.
    pub fn mark_abandoned(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// Returns true while the channel is handed out and not closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.opened.load(Ordering::SeqCst) && !self.is_closed()
    }

    /// Returns true once the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Registers a close listener.
    pub fn add_listener(&self, listener: Arc<dyn StreamListener>) {
        self.inner.listeners.lock().add(listener);
    }
}

impl std::fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelState")
            .field("content_url", &self.inner.content_url)
            .field("open", &self.is_open())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read channel that marks its accessor closed when dropped.
pub struct TrackedReadChannel<R> {
    inner: R,
    state: ChannelState,
}

impl<R: Read> TrackedReadChannel<R> {
    /// Wraps `inner`, whose accessor state is `state`.
    pub fn new(inner: R, state: ChannelState) -> Self {
        Self { inner, state }
    }
}

impl<R: Read> Read for TrackedReadChannel<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R> Drop for TrackedReadChannel<R> {
    fn drop(&mut self) {
        if let Err(e) = self.state.mark_closed() {
            tracing::warn!(url = self.state.content_url(), error = %e, "Closing read channel failed");
        }
    }
}
