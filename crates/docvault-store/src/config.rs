//! Configuration surface.
//!
//! Store instances are registered by name in a [`StoreRegistry`]; the
//! configuration refers to them by those names. Loading layers an optional
//! file under `DOCVAULT__`-prefixed environment overrides, e.g.
//! `DOCVAULT__AGGREGATE__PRIMARY=local`.

use crate::aggregate::AggregatingContentStore;
use crate::encrypted::EncryptingContentStore;
use crate::store::ContentStore;
use crate::{StorageError, StorageResult};
use config::{Config, Environment, File};
use docvault_crypto::{KeyAlgorithm, SymmetricKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DocVaultConfig {
    /// Aggregating store wiring.
    #[serde(default)]
    pub aggregate: AggregatingStoreConfig,

    /// Encryption at rest; disabled when absent.
    #[serde(default)]
    pub encryption: Option<EncryptionConfig>,
}

/// Aggregating store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatingStoreConfig {
    /// Registry name of the primary store.
    #[serde(default)]
    pub primary: Option<String>,

    /// Registry names of the secondary stores, in read-fallback order.
    #[serde(default)]
    pub secondaries: Option<Vec<String>>,

    /// Whether deletes also reach the secondaries.
    #[serde(default = "default_true")]
    pub delete_from_secondaries: bool,
}

impl Default for AggregatingStoreConfig {
    fn default() -> Self {
        Self {
            primary: None,
            secondaries: None,
            delete_from_secondaries: default_true(),
        }
    }
}

/// Encryption configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EncryptionConfig {
    /// Cipher algorithm.
    #[serde(default)]
    pub algorithm: KeyAlgorithm,

    /// Base64-encoded key material.
    #[serde(default)]
    pub key: Option<String>,
}

fn default_true() -> bool {
    true
}

impl EncryptionConfig {
    /// Decodes the configured key.
    pub fn to_key(&self) -> StorageResult<SymmetricKey> {
        let encoded = self
            .key
            .as_deref()
            .ok_or_else(|| StorageError::Configuration("encryption key not set".to_string()))?;
        SymmetricKey::from_base64(self.algorithm, encoded)
            .map_err(|e| StorageError::Configuration(format!("invalid encryption key: {e}")))
    }
}

impl DocVaultConfig {
    /// Loads `config/docvault` (any supported format, optional) plus the
    /// environment.
    pub fn load() -> StorageResult<Self> {
        Self::from_builder(
            Config::builder().add_source(File::with_name("config/docvault").required(false)),
        )
    }

    /// Loads the given file plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::from_builder(Config::builder().add_source(File::from(path.as_ref())))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> StorageResult<Self> {
        let config = builder
            .add_source(
                Environment::with_prefix("DOCVAULT")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("aggregate.secondaries")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Builds the configured store from `registry`.
    ///
    /// The aggregating store is wrapped for encryption when an encryption
    /// section is present.
    pub fn build(&self, registry: &StoreRegistry) -> StorageResult<Arc<dyn ContentStore>> {
        let aggregate: Arc<dyn ContentStore> = Arc::new(registry.build_aggregating(&self.aggregate)?);
        match &self.encryption {
            Some(encryption) => Ok(Arc::new(EncryptingContentStore::new(
                aggregate,
                encryption.to_key()?,
            )?)),
            None => Ok(aggregate),
        }
    }
}

/// Named store instances referenced by configuration.
#[derive(Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn ContentStore>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, store: Arc<dyn ContentStore>) {
        self.stores.insert(name.into(), store);
    }

    /// Looks up a store by name.
    pub fn get(&self, name: &str) -> StorageResult<Arc<dyn ContentStore>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::Configuration(format!("unknown store '{name}'")))
    }

    /// Builds an aggregating store, resolving every name up front.
    pub fn build_aggregating(
        &self,
        config: &AggregatingStoreConfig,
    ) -> StorageResult<AggregatingContentStore> {
        let mut builder = AggregatingContentStore::builder()
            .delete_from_secondaries(config.delete_from_secondaries);

        if let Some(name) = &config.primary {
            builder = builder.primary(self.get(name)?);
        }
        if let Some(names) = &config.secondaries {
            let secondaries = names
                .iter()
                .map(|name| self.get(name))
                .collect::<StorageResult<Vec<_>>>()?;
            builder = builder.secondaries(secondaries);
        }

        builder.build()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.stores.keys().collect();
        names.sort();
        f.debug_struct("StoreRegistry").field("stores", &names).finish()
    }
}
