//! Accessor and cipher listeners.

use crate::StorageResult;
use std::sync::Arc;

/// Notified when an accessor's channel is closed.
pub trait StreamListener: Send + Sync {
    /// Called once, after the channel for `content_url` has been closed.
    fn content_stream_closed(&self, content_url: &str) -> StorageResult<()>;
}

/// Notified after every block of bytes the encrypting channel processes.
pub trait EncryptionListener: Send + Sync {
    /// `plain_bytes` were consumed and `cipher_bytes` written to the target.
    fn on_encrypted(&self, plain_bytes: u64, cipher_bytes: u64);
}

impl<F> StreamListener for F
where
    F: Fn(&str) -> StorageResult<()> + Send + Sync,
{
    fn content_stream_closed(&self, content_url: &str) -> StorageResult<()> {
        self(content_url)
    }
}

/// Ordered, append-only listener collection.
pub struct Listeners<L: ?Sized> {
    items: Vec<Arc<L>>,
}

impl<L: ?Sized> Listeners<L> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Appends a listener; notification order is registration order.
    pub fn add(&mut self, listener: Arc<L>) {
        self.items.push(listener);
    }

    /// Iterates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<L>> {
        self.items.iter()
    }

    /// Returns the number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> Clone for Listeners<L> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl Listeners<dyn EncryptionListener> {
    /// Reports a `(plain, cipher)` delta to every listener.
    pub fn notify(&self, plain_bytes: u64, cipher_bytes: u64) {
        for listener in &self.items {
            listener.on_encrypted(plain_bytes, cipher_bytes);
        }
    }
}

impl Listeners<dyn StreamListener> {
    /// Tells every listener the channel closed. All listeners run; the first
    /// error is returned.
    pub fn notify_closed(&self, content_url: &str) -> StorageResult<()> {
        let mut first_err = None;
        for listener in &self.items {
            if let Err(e) = listener.content_stream_closed(content_url) {
                tracing::warn!(url = content_url, error = %e, "Stream listener failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl<L: ?Sized> std::fmt::Debug for Listeners<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.items.len()).finish()
    }
}
