//! Encrypt-on-write channel and writer facade.

use crate::accessor::{ContentAccessor, ContentReader, ContentWriter, WriteChannel};
use crate::decrypt::DecryptingContentReader;
use crate::error::cipher_io_error;
use crate::facade::ContentWriterFacade;
use crate::listener::{EncryptionListener, Listeners, StreamListener};
use crate::{StorageError, StorageResult};
use docvault_crypto::{CipherContext, SymmetricKey};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Write channel that encrypts plaintext before it reaches `target`.
///
/// Not thread-safe: one writer thread per channel. The ciphertext buffer is
/// reused across writes and only ever grows.
pub struct EncryptingWriteChannel<W: WriteChannel> {
    target: Option<W>,
    cipher: CipherContext,
    buffer: Vec<u8>,
    listeners: Listeners<dyn EncryptionListener>,
    closed: bool,
}

impl<W: WriteChannel> EncryptingWriteChannel<W> {
    /// Wraps `target`, encrypting with `key`.
    ///
    /// Fails if the cipher cannot be set up for this key.
    pub fn new(target: W, key: &SymmetricKey) -> StorageResult<Self> {
        let cipher = CipherContext::encryptor(key)
            .map_err(|e| StorageError::Configuration(format!("cipher setup failed: {e}")))?;
        Ok(Self {
            target: Some(target),
            cipher,
            buffer: Vec::new(),
            listeners: Listeners::new(),
            closed: false,
        })
    }

    /// Registers a listener for `(plain, cipher)` byte deltas.
    pub fn add_listener(&mut self, listener: Arc<dyn EncryptionListener>) {
        self.listeners.add(listener);
    }

    fn ensure_capacity(&mut self, needed: usize) {
        self.buffer.clear();
        if self.buffer.capacity() < needed {
            self.buffer.reserve(needed);
        }
    }

    /// Writes the buffered ciphertext to the target and resets the buffer.
    fn drain_buffer(&mut self) -> io::Result<usize> {
        let written = self.buffer.len();
        let target = self
            .target
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "encrypting channel is closed"))?;
        target.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(written)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.ensure_capacity(self.cipher.final_size());
        self.cipher
            .finalize(&mut self.buffer)
            .map_err(cipher_io_error)?;
        let written = self.drain_buffer()?;
        self.listeners.notify(0, written as u64);
        Ok(())
    }
}

impl<W: WriteChannel> Write for EncryptingWriteChannel<W> {
    /// Returns the number of plaintext bytes consumed.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "encrypting channel is closed",
            ));
        }

        self.ensure_capacity(self.cipher.output_size(buf.len()));
        self.cipher
            .update(buf, &mut self.buffer)
            .map_err(cipher_io_error)?;
        let written = self.drain_buffer()?;
        self.listeners.notify(buf.len() as u64, written as u64);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.target.as_mut() {
            Some(target) => target.flush(),
            None => Ok(()),
        }
    }
}

impl<W: WriteChannel> WriteChannel for EncryptingWriteChannel<W> {
    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }

        let finished = self.finish();
        self.closed = true;
        // The target is released whether or not finalization succeeded.
        let released = match self.target.take() {
            Some(mut target) => target.close(),
            None => Ok(()),
        };
        finished.and(released)
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

impl<W: WriteChannel> Drop for EncryptingWriteChannel<W> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "Closing encrypting channel on drop failed");
            }
        }
    }
}

impl<W: WriteChannel> std::fmt::Debug for EncryptingWriteChannel<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptingWriteChannel")
            .field("cipher", &self.cipher)
            .field("buffer_capacity", &self.buffer.capacity())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Running totals of what an encrypting channel has processed.
#[derive(Debug, Default)]
pub struct EncryptionTotals {
    plain: AtomicU64,
    cipher: AtomicU64,
}

impl EncryptionTotals {
    /// Plaintext bytes consumed so far.
    #[must_use]
    pub fn plain_bytes(&self) -> u64 {
        self.plain.load(Ordering::SeqCst)
    }

    /// Ciphertext bytes written so far.
    #[must_use]
    pub fn cipher_bytes(&self) -> u64 {
        self.cipher.load(Ordering::SeqCst)
    }
}

impl EncryptionListener for EncryptionTotals {
    fn on_encrypted(&self, plain_bytes: u64, cipher_bytes: u64) {
        self.plain.fetch_add(plain_bytes, Ordering::SeqCst);
        self.cipher.fetch_add(cipher_bytes, Ordering::SeqCst);
    }
}

/// Writer whose channel encrypts everything written through it.
///
/// [`size`](ContentAccessor::size) reports plaintext bytes written, not the
/// padded length stored by the underlying writer.
pub struct EncryptingContentWriter {
    facade: ContentWriterFacade,
    key: Arc<SymmetricKey>,
    totals: Arc<EncryptionTotals>,
    listeners: Listeners<dyn EncryptionListener>,
}

impl EncryptingContentWriter {
    /// Wraps `delegate`. Fails if the cipher cannot be set up for `key`.
    pub fn new(delegate: Box<dyn ContentWriter>, key: Arc<SymmetricKey>) -> StorageResult<Self> {
        CipherContext::encryptor(&key)
            .map_err(|e| StorageError::Configuration(format!("cipher setup failed: {e}")))?;
        Ok(Self {
            facade: ContentWriterFacade::new(delegate),
            key,
            totals: Arc::new(EncryptionTotals::default()),
            listeners: Listeners::new(),
        })
    }

    /// Registers a listener on the channel this writer will open.
    pub fn add_encryption_listener(&mut self, listener: Arc<dyn EncryptionListener>) {
        self.listeners.add(listener);
    }

    /// Plaintext bytes written so far.
    #[must_use]
    pub fn plaintext_size(&self) -> u64 {
        self.totals.plain_bytes()
    }

    /// Ciphertext bytes written so far.
    #[must_use]
    pub fn ciphertext_size(&self) -> u64 {
        self.totals.cipher_bytes()
    }

    /// Shared totals, readable after the writer itself is gone.
    #[must_use]
    pub fn totals(&self) -> Arc<EncryptionTotals> {
        self.totals.clone()
    }
}

impl ContentAccessor for EncryptingContentWriter {
    fn content_url(&self) -> &str {
        self.facade.content_url()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.plaintext_size())
    }

    fn mimetype(&self) -> StorageResult<Option<String>> {
        self.facade.mimetype()
    }

    fn set_mimetype(&mut self, mimetype: &str) -> StorageResult<()> {
        self.facade.set_mimetype(mimetype)
    }

    fn encoding(&self) -> StorageResult<Option<String>> {
        self.facade.encoding()
    }

    fn set_encoding(&mut self, encoding: &str) -> StorageResult<()> {
        self.facade.set_encoding(encoding)
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        self.facade.locale()
    }

    fn set_locale(&mut self, locale: &str) -> StorageResult<()> {
        self.facade.set_locale(locale)
    }

    fn is_channel_open(&self) -> StorageResult<bool> {
        self.facade.is_channel_open()
    }

    fn add_listener(&mut self, listener: Arc<dyn StreamListener>) -> StorageResult<()> {
        self.facade.add_listener(listener)
    }
}

impl ContentWriter for EncryptingContentWriter {
    fn channel(&mut self) -> StorageResult<Box<dyn WriteChannel>> {
        let target = self.facade.channel()?;
        let mut channel = EncryptingWriteChannel::new(target, &self.key)?;
        channel.add_listener(self.totals.clone());
        for listener in self.listeners.iter() {
            channel.add_listener(listener.clone());
        }
        Ok(Box::new(channel))
    }

    fn is_closed(&self) -> StorageResult<bool> {
        self.facade.is_closed()
    }

    /// Reader decrypting what this writer wrote; meaningful once closed.
    fn get_reader(&self) -> StorageResult<Box<dyn ContentReader>> {
        let reader = self.facade.get_reader()?;
        Ok(Box::new(DecryptingContentReader::new(
            reader,
            self.key.clone(),
            self.plaintext_size(),
        )?))
    }
}
