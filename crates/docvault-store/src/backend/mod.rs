//! Reference content store implementations.

pub mod filesystem;
pub mod memory;

pub use filesystem::FileContentStore;
pub use memory::{InMemoryContentStore, DEFAULT_PROTOCOL};

use serde::{Deserialize, Serialize};

/// Storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Total number of objects.
    pub object_count: u64,
    /// Total size in bytes.
    pub total_size: u64,
    /// Available space (if known).
    pub available_space: Option<u64>,
}
