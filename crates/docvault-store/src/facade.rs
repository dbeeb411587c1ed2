//! Lazily delegating accessor facades.
//!
//! A facade either wraps an accessor it was handed, or builds one on first
//! use through a factory. Every operation resolves the delegate and forwards
//! to it. Decorators (the encrypting writer, the decrypting reader) own a
//! facade and override only what they change.

use crate::accessor::{ContentAccessor, ContentReader, ContentWriter, ReadChannel, WriteChannel};
use crate::listener::StreamListener;
use crate::{StorageError, StorageResult};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;

type Factory<T> = Box<dyn FnOnce() -> StorageResult<T> + Send>;

/// A delegate that is either bound already or created on first access.
///
/// The factory runs at most once, also when several threads race on first
/// access. If it fails, the error goes to that caller and later accesses
/// report [`StorageError::DelegateUnavailable`].
pub struct LazyDelegate<T> {
    cell: OnceCell<T>,
    factory: Mutex<Option<Factory<T>>>,
}

impl<T> LazyDelegate<T> {
    /// Wraps an existing delegate.
    pub fn bound(delegate: T) -> Self {
        Self {
            cell: OnceCell::with_value(delegate),
            factory: Mutex::new(None),
        }
    }

    /// Defers creation of the delegate to `factory`.
    pub fn deferred<F>(factory: F) -> Self
    where
        F: FnOnce() -> StorageResult<T> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Mutex::new(Some(Box::new(factory))),
        }
    }

    /// Returns true once the delegate exists.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the delegate, creating it if needed.
    pub fn get(&self) -> StorageResult<&T> {
        self.cell.get_or_try_init(|| {
            let factory = self.factory.lock().take().ok_or_else(|| {
                StorageError::DelegateUnavailable("delegate factory already consumed".to_string())
            })?;
            factory()
        })
    }

    /// Returns the delegate mutably, creating it if needed.
    pub fn get_mut(&mut self) -> StorageResult<&mut T> {
        self.get()?;
        self.cell.get_mut().ok_or_else(|| {
            StorageError::DelegateUnavailable("delegate not initialized".to_string())
        })
    }
}

impl<T> std::fmt::Debug for LazyDelegate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyDelegate")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Reader facade forwarding to a lazily resolved reader.
pub struct ContentReaderFacade {
    content_url: String,
    delegate: LazyDelegate<Box<dyn ContentReader>>,
}

impl ContentReaderFacade {
    /// Wraps an existing reader.
    pub fn new(delegate: Box<dyn ContentReader>) -> Self {
        Self {
            content_url: delegate.content_url().to_string(),
            delegate: LazyDelegate::bound(delegate),
        }
    }

    /// Creates the reader for `content_url` on first use.
    pub fn deferred<F>(content_url: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce() -> StorageResult<Box<dyn ContentReader>> + Send + 'static,
    {
        Self {
            content_url: content_url.into(),
            delegate: LazyDelegate::deferred(factory),
        }
    }

    /// Returns the resolved delegate.
    pub fn delegate(&self) -> StorageResult<&dyn ContentReader> {
        Ok(&**self.delegate.get()?)
    }

    /// Returns the resolved delegate mutably.
    pub fn delegate_mut(&mut self) -> StorageResult<&mut (dyn ContentReader + 'static)> {
        Ok(&mut **self.delegate.get_mut()?)
    }

    /// Returns true once the delegate exists.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.delegate.is_resolved()
    }
}

impl ContentAccessor for ContentReaderFacade {
    fn content_url(&self) -> &str {
        &self.content_url
    }

    fn size(&self) -> StorageResult<u64> {
        self.delegate()?.size()
    }

    fn mimetype(&self) -> StorageResult<Option<String>> {
        self.delegate()?.mimetype()
    }

    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()> {
        self.delegate_mut()?.set_mimetype(mimetype)
    }

    fn encoding(&self) -> StorageResult<Option<String>> {
        self.delegate()?.encoding()
    }

    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()> {
        self.delegate_mut()?.set_encoding(encoding)
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        self.delegate()?.locale()
    }

    fn set_locale(&mut self, locale: &str) -> StorageResult<()> {
        self.delegate_mut()?.set_locale(locale)
    }

    fn is_channel_open(&self) -> StorageResult<bool> {
        self.delegate()?.is_channel_open()
    }

    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()> {
        self.delegate_mut()?.add_listener(listener)
    }
}

impl ContentReader for ContentReaderFacade {
    fn exists(&self) -> StorageResult<bool> {
        self.delegate()?.exists()
    }

    fn channel(&mut self) -> StorageResult<ReadChannel> {
        self.delegate_mut()?.channel()
    }

    fn reopen(&self) -> StorageResult<Box<dyn ContentReader>> {
        self.delegate()?.reopen()
    }
}

/// Writer facade forwarding to a lazily resolved writer.
pub struct ContentWriterFacade {
    content_url: String,
    delegate: LazyDelegate<Box<dyn ContentWriter>>,
}

impl ContentWriterFacade {
    /// Wraps an existing writer.
    pub fn new(delegate: Box<dyn ContentWriter>) -> Self {
        Self {
            content_url: delegate.content_url().to_string(),
            delegate: LazyDelegate::bound(delegate),
        }
    }

    /// Returns the resolved delegate.
    pub fn delegate(&self) -> StorageResult<&dyn ContentWriter> {
        Ok(&**self.delegate.get()?)
    }

    /// Returns the resolved delegate mutably.
    pub fn delegate_mut(&mut self) -> StorageResult<&mut (dyn ContentWriter + 'static)> {
        Ok(&mut **self.delegate.get_mut()?)
    }
}

impl ContentAccessor for ContentWriterFacade {
    fn content_url(&self) -> &str {
        &self.content_url
    }

    fn size(&self) -> StorageResult<u64> {
        self.delegate()?.size()
    }

    fn mimetype(&self) -> StorageResult<Option<String>> {
        self.delegate()?.mimetype()
    }

    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()> {
        self.delegate_mut()?.set_mimetype(mimetype)
    }

    fn encoding(&self) -> StorageResult<Option<String>> {
        self.delegate()?.encoding()
    }

    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()> {
        self.delegate_mut()?.set_encoding(encoding)
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        self.delegate()?.locale()
    }

    fn set_locale(&mut self, locale: &str) -> StorageResult<()> {
        self.delegate_mut()?.set_locale(locale)
    }

    fn is_channel_open(&self) -> StorageResult<bool> {
        self.delegate()?.is_channel_open()
    }

    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()> {
        self.delegate_mut()?.add_listener(listener)
    }
}

impl ContentWriter for ContentWriterFacade {
    fn channel(&mut self) -> StorageResult<Box<dyn WriteChannel>> {
        self.delegate_mut()?.channel()
    }

    fn is_closed(&self) -> StorageResult<bool> {
        self.delegate()?.is_closed()
    }

    fn get_reader(&self) -> StorageResult<Box<dyn ContentReader>> {
        self.delegate()?.get_reader()
    }
}
