//! Mock implementations for testing.

use docvault_store::{
    ContentReader, ContentStore, ContentWriter, InMemoryContentStore, StorageError,
    StorageResult, WriterContext,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared, ordered log of store calls across several mocks.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: RwLock<Vec<String>>,
}

impl CallLog {
    /// Creates a new shared log.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records a call.
    pub fn record(&self, store: &str, operation: &str) {
        self.calls.write().push(format!("{store}.{operation}"));
    }

    /// Returns all recorded calls in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    /// Returns the recorded calls for one operation, in order.
    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        let suffix = format!(".{operation}");
        self.calls
            .read()
            .iter()
            .filter(|c| c.ends_with(&suffix))
            .cloned()
            .collect()
    }

    /// Clears recorded calls.
    pub fn clear(&self) {
        self.calls.write().clear();
    }
}

/// Programmable store recording every call it receives.
///
/// Content is held by an in-memory store; every answer can be overridden.
pub struct MockStore {
    name: String,
    log: Arc<CallLog>,
    backing: InMemoryContentStore,
    supports: RwLock<Option<bool>>,
    writable: RwLock<bool>,
    no_reader: RwLock<bool>,
    delete_result: RwLock<Option<bool>>,
    delete_error: RwLock<Option<String>>,
}

impl MockStore {
    /// Creates a writable mock claiming the `store` protocol.
    pub fn new(name: &str, log: &Arc<CallLog>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            backing: InMemoryContentStore::new().named(name),
            supports: RwLock::new(None),
            writable: RwLock::new(true),
            no_reader: RwLock::new(false),
            delete_result: RwLock::new(None),
            delete_error: RwLock::new(None),
        })
    }

    /// Seeds content directly.
    pub fn seed(&self, url: &str, data: &[u8]) {
        self.backing.put(url, data).unwrap();
    }

    /// Returns true if the mock holds `url`.
    pub fn holds(&self, url: &str) -> bool {
        self.backing.raw_content(url).is_some()
    }

    /// Forces the URL-support answer.
    pub fn set_supports(&self, supports: bool) {
        *self.supports.write() = Some(supports);
    }

    /// Sets whether writes and deletes are supported.
    pub fn set_writable(&self, writable: bool) {
        *self.writable.write() = writable;
    }

    /// Makes `get_reader` return no reader at all.
    pub fn set_no_reader(&self, no_reader: bool) {
        *self.no_reader.write() = no_reader;
    }

    /// Forces the result of `delete`.
    pub fn set_delete_result(&self, result: bool) {
        *self.delete_result.write() = Some(result);
    }

    /// Makes `delete` fail with a backend error.
    pub fn set_delete_error(&self, message: &str) {
        *self.delete_error.write() = Some(message.to_string());
    }
}

impl ContentStore for MockStore {
    fn is_write_supported(&self) -> bool {
        self.log.record(&self.name, "is_write_supported");
        *self.writable.read()
    }

    fn is_content_url_supported(&self, content_url: &str) -> bool {
        self.log.record(&self.name, "is_content_url_supported");
        self.supports
            .read()
            .unwrap_or_else(|| self.backing.is_content_url_supported(content_url))
    }

    fn get_reader(&self, content_url: &str) -> StorageResult<Option<Box<dyn ContentReader>>> {
        self.log.record(&self.name, "get_reader");
        if *self.no_reader.read() {
            return Ok(None);
        }
        self.backing.get_reader(content_url)
    }

    fn get_writer(&self, context: &WriterContext) -> StorageResult<Box<dyn ContentWriter>> {
        self.log.record(&self.name, "get_writer");
        self.backing.get_writer(context)
    }

    fn delete(&self, content_url: &str) -> StorageResult<bool> {
        self.log.record(&self.name, "delete");
        if let Some(message) = self.delete_error.read().clone() {
            return Err(StorageError::Backend(message));
        }
        let deleted = self.backing.delete(content_url)?;
        Ok(self.delete_result.read().unwrap_or(deleted))
    }

    fn root_location(&self) -> String {
        self.log.record(&self.name, "root_location");
        self.backing.root_location()
    }
}
