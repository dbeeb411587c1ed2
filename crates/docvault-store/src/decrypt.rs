//! Decrypt-on-read channel and reader facade.

use crate::accessor::{ContentAccessor, ContentReader, ReadChannel};
use crate::error::cipher_io_error;
use crate::facade::ContentReaderFacade;
use crate::listener::StreamListener;
use crate::store::ContentStore;
use crate::{StorageError, StorageResult};
use docvault_crypto::{CipherContext, SymmetricKey};
use std::io::{self, Read};
use std::sync::Arc;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Read channel that decrypts ciphertext from `inner`.
///
/// Uses the same transformation as the encrypting channel, in decrypt mode.
pub struct DecryptingReadChannel<R: Read> {
    inner: R,
    cipher: CipherContext,
    input: Box<[u8]>,
    output: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> DecryptingReadChannel<R> {
    /// Wraps `inner`, decrypting with `key`.
    pub fn new(inner: R, key: &SymmetricKey) -> StorageResult<Self> {
        let cipher = CipherContext::decryptor(key)
            .map_err(|e| StorageError::Configuration(format!("cipher setup failed: {e}")))?;
        Ok(Self {
            inner,
            cipher,
            input: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            output: Vec::with_capacity(READ_BUFFER_SIZE),
            pos: 0,
            done: false,
        })
    }
}

impl<R: Read> Read for DecryptingReadChannel<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos < self.output.len() {
                let n = buf.len().min(self.output.len() - self.pos);
                buf[..n].copy_from_slice(&self.output[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }

            self.output.clear();
            self.pos = 0;
            let n = match self.inner.read(&mut self.input) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.done = true;
                self.cipher
                    .finalize(&mut self.output)
                    .map_err(cipher_io_error)?;
            } else {
                self.cipher
                    .update(&self.input[..n], &mut self.output)
                    .map_err(cipher_io_error)?;
            }
        }
    }
}

/// Reader that decrypts its delegate's content and reports plaintext size.
///
/// The stored content is padded, so its length says nothing reliable about
/// the plaintext; the size recorded when the content was encrypted is
/// reported instead.
pub struct DecryptingContentReader {
    facade: ContentReaderFacade,
    key: Arc<SymmetricKey>,
    plaintext_size: u64,
    source: Option<Arc<dyn ContentStore>>,
}

impl DecryptingContentReader {
    /// Wraps `delegate`. Fails if the cipher cannot be set up for `key`.
    pub fn new(
        delegate: Box<dyn ContentReader>,
        key: Arc<SymmetricKey>,
        plaintext_size: u64,
    ) -> StorageResult<Self> {
        CipherContext::decryptor(&key)
            .map_err(|e| StorageError::Configuration(format!("cipher setup failed: {e}")))?;
        Ok(Self {
            facade: ContentReaderFacade::new(delegate),
            key,
            plaintext_size,
            source: None,
        })
    }

    /// Records the store holding the ciphertext, so [`reopen`] can fetch a
    /// fresh underlying reader from it.
    ///
    /// [`reopen`]: ContentReader::reopen
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ContentStore>) -> Self {
        self.source = Some(source);
        self
    }

    fn deferred(
        content_url: String,
        key: Arc<SymmetricKey>,
        plaintext_size: u64,
        source: Arc<dyn ContentStore>,
    ) -> Self {
        let store = source.clone();
        let url = content_url.clone();
        let facade = ContentReaderFacade::deferred(content_url, move || {
            store
                .get_reader(&url)?
                .ok_or_else(|| StorageError::NotFound(url.clone()))
        });
        Self {
            facade,
            key,
            plaintext_size,
            source: Some(source),
        }
    }

    /// The plaintext size recorded at encryption time.
    #[must_use]
    pub fn plaintext_size(&self) -> u64 {
        self.plaintext_size
    }

    /// The size of the stored ciphertext.
    pub fn stored_size(&self) -> StorageResult<u64> {
        self.facade.size()
    }
}

impl ContentAccessor for DecryptingContentReader {
    fn content_url(&self) -> &str {
        self.facade.content_url()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.plaintext_size)
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

impl ContentReader for DecryptingContentReader {
    fn exists(&self) -> StorageResult<bool> {
        self.facade.exists()
    }

    fn channel(&mut self) -> StorageResult<ReadChannel> {
        let inner = self.facade.channel()?;
        Ok(Box::new(DecryptingReadChannel::new(inner, &self.key)?))
    }

    fn reopen(&self) -> StorageResult<Box<dyn ContentReader>> {
        let reader = match &self.source {
            Some(source) => Self::deferred(
                self.content_url().to_string(),
                self.key.clone(),
                self.plaintext_size,
                source.clone(),
            ),
            None => Self::new(self.facade.reopen()?, self.key.clone(), self.plaintext_size)?,
        };
        Ok(Box::new(reader))
    }
}
