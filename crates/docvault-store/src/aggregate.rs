//! Aggregating content store.
//!
//! Composes one primary store with an ordered list of secondary stores.
//! Writes go to the primary only. Reads try the primary, then each
//! secondary in order, and return the first reader whose content exists.
//! Deletes reach the primary and, unless disabled, every secondary.

use crate::accessor::{ContentReader, ContentWriter};
use crate::store::{ContentStore, WriterContext};
use crate::{StorageError, StorageResult};
use std::sync::Arc;
use tracing::debug;

/// Store that resolves reads across a primary and ordered secondaries.
pub struct AggregatingContentStore {
    primary: Arc<dyn ContentStore>,
    secondaries: Vec<Arc<dyn ContentStore>>,
    delete_from_secondaries: bool,
}

impl AggregatingContentStore {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> AggregatingContentStoreBuilder {
        AggregatingContentStoreBuilder::default()
    }

    /// Creates a store with secondary deletion enabled.
    #[must_use]
    pub fn new(primary: Arc<dyn ContentStore>, secondaries: Vec<Arc<dyn ContentStore>>) -> Self {
        Self {
            primary,
            secondaries,
            delete_from_secondaries: true,
        }
    }

    /// Returns the primary store.
    #[must_use]
    pub fn primary(&self) -> &Arc<dyn ContentStore> {
        &self.primary
    }

    /// Returns the secondary stores in read-fallback order.
    #[must_use]
    pub fn secondaries(&self) -> &[Arc<dyn ContentStore>] {
        &self.secondaries
    }

    /// Returns true if deletes also reach the secondaries.
    #[must_use]
    pub fn deletes_from_secondaries(&self) -> bool {
        self.delete_from_secondaries
    }

    /// Primary first, then secondaries in order.
    fn stores(&self) -> impl Iterator<Item = &Arc<dyn ContentStore>> {
        std::iter::once(&self.primary).chain(self.secondaries.iter())
    }

    fn delete_from(store: &dyn ContentStore, content_url: &str) -> StorageResult<bool> {
        if !store.is_write_supported() || !store.is_content_url_supported(content_url) {
            // Nothing this store could hold or remove.
            return Ok(true);
        }
        store.delete(content_url)
    }
}

impl ContentStore for AggregatingContentStore {
    fn is_write_supported(&self) -> bool {
        self.primary.is_write_supported()
    }

    fn is_content_url_supported(&self, content_url: &str) -> bool {
        self.stores()
            .any(|store| store.is_content_url_supported(content_url))
    }

    fn get_reader(&self, content_url: &str) -> StorageResult<Option<Box<dyn ContentReader>>> {
        let mut last: Option<Box<dyn ContentReader>> = None;

        for (index, store) in self.stores().enumerate() {
            if !store.is_content_url_supported(content_url) {
                continue;
            }
            let reader = store.get_reader(content_url)?;
            let exists = match &reader {
                Some(candidate) => candidate.exists()?,
                None => false,
            };
            if exists {
                debug!(url = content_url, store = index, "Content found");
                return Ok(reader);
            }
            last = reader;
        }

        debug!(url = content_url, reader = last.is_some(), "Content not found in any store");
        Ok(last)
    }

    fn get_writer(&self, context: &WriterContext) -> StorageResult<Box<dyn ContentWriter>> {
        self.primary.get_writer(context)
    }

    fn delete(&self, content_url: &str) -> StorageResult<bool> {
        let deleted = if self.delete_from_secondaries {
            // Every store gets its attempt; no short-circuit on failure.
            let mut all = true;
            for store in self.stores() {
                let result = Self::delete_from(store.as_ref(), content_url)?;
                all &= result;
            }
            all
        } else {
            Self::delete_from(self.primary.as_ref(), content_url)?
        };

        debug!(
            url = content_url,
            deleted,
            secondaries = self.delete_from_secondaries,
            "Delete resolved"
        );
        Ok(deleted)
    }

    fn root_location(&self) -> String {
        self.primary.root_location()
    }
}

impl std::fmt::Debug for AggregatingContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatingContentStore")
            .field("primary", &self.primary.root_location())
            .field(
                "secondaries",
                &self
                    .secondaries
                    .iter()
                    .map(|s| s.root_location())
                    .collect::<Vec<_>>(),
            )
            .field("delete_from_secondaries", &self.delete_from_secondaries)
            .finish()
    }
}

/// Builder validating the store set before first use.
pub struct AggregatingContentStoreBuilder {
    primary: Option<Arc<dyn ContentStore>>,
    secondaries: Option<Vec<Arc<dyn ContentStore>>>,
    delete_from_secondaries: bool,
}

impl Default for AggregatingContentStoreBuilder {
    fn default() -> Self {
        Self {
            primary: None,
            secondaries: None,
            delete_from_secondaries: true,
        }
    }
}

impl AggregatingContentStoreBuilder {
    /// Sets the primary store.
    #[must_use]
    pub fn primary(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.primary = Some(store);
        self
    }

    /// Sets the secondary stores; order is read-fallback priority.
    #[must_use]
    pub fn secondaries(mut self, stores: Vec<Arc<dyn ContentStore>>) -> Self {
        self.secondaries = Some(stores);
        self
    }

    /// Chooses whether deletes also reach the secondaries (default: true).
    #[must_use]
    pub fn delete_from_secondaries(mut self, enabled: bool) -> Self {
        self.delete_from_secondaries = enabled;
        self
    }

    /// Builds the store. Fails if the primary or the secondary list is missing.
    pub fn build(self) -> StorageResult<AggregatingContentStore> {
        let primary = self
            .primary
            .ok_or_else(|| StorageError::Configuration("primary store not set".to_string()))?;
        let secondaries = self.secondaries.ok_or_else(|| {
            StorageError::Configuration("secondary store list not set".to_string())
        })?;
        Ok(AggregatingContentStore {
            primary,
            secondaries,
            delete_from_secondaries: self.delete_from_secondaries,
        })
    }
}
