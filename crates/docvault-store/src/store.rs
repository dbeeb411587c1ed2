//! Content store capability.

use crate::accessor::{ContentReader, ContentWriter};
use crate::StorageResult;
use serde::{Deserialize, Serialize};

/// Parameters for obtaining a writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterContext {
    /// URL to write to; the store generates one when absent.
    pub content_url: Option<String>,
    /// Content type (MIME).
    pub mimetype: Option<String>,
    /// Character encoding.
    pub encoding: Option<String>,
    /// Locale tag.
    pub locale: Option<String>,
}

impl WriterContext {
    /// Context letting the store pick a new URL.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for an explicit URL.
    #[must_use]
    pub fn for_url(content_url: impl Into<String>) -> Self {
        Self {
            content_url: Some(content_url.into()),
            ..Self::default()
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Sets the character encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Sets the locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// A store of binary content addressed by content URL.
pub trait ContentStore: Send + Sync {
    /// Returns true if the store accepts writes and deletes.
    fn is_write_supported(&self) -> bool;

    /// Returns true if the store handles `content_url`.
    fn is_content_url_supported(&self, content_url: &str) -> bool;

    /// Returns a reader for `content_url`.
    ///
    /// The reader may report that the content does not exist.
    fn get_reader(&self, content_url: &str) -> StorageResult<Option<Box<dyn ContentReader>>>;

    /// Returns a writer for new content.
    fn get_writer(&self, context: &WriterContext) -> StorageResult<Box<dyn ContentWriter>>;

    /// Deletes `content_url`. Returns true if the content is gone afterwards.
    fn delete(&self, content_url: &str) -> StorageResult<bool>;

    /// Describes where the store keeps its content.
    fn root_location(&self) -> String;

    /// Returns true if `content_url` exists in this store.
    fn exists(&self, content_url: &str) -> StorageResult<bool> {
        match self.get_reader(content_url)? {
            Some(reader) => reader.exists(),
            None => Ok(false),
        }
    }
}
