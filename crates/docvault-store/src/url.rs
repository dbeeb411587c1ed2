//! Content URLs.
//!
//! A content URL is `protocol://path`. Stores claim URLs by protocol; the
//! path is opaque to everything but the owning store.

use crate::{StorageError, StorageResult};
use chrono::{Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between protocol and path.
pub const PROTOCOL_DELIMITER: &str = "://";

/// A parsed content URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentUrl {
    /// Protocol, e.g. `store`.
    pub protocol: String,
    /// Store-relative path.
    pub path: String,
}

impl ContentUrl {
    /// Creates a URL from parts.
    #[must_use]
    pub fn new(protocol: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            path: path.into(),
        }
    }

    /// Generates a fresh, time-sharded URL: `protocol://yyyy/M/d/H/m/<uuid>.bin`.
    #[must_use]
    pub fn generate(protocol: &str) -> Self {
        let now = Utc::now();
        let path = format!(
            "{}/{}/{}/{}/{}/{}.bin",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            uuid::Uuid::new_v4()
        );
        Self::new(protocol, path)
    }

    /// Parses a URL, rejecting empty parts and parent-directory segments.
    pub fn parse(url: &str) -> StorageResult<Self> {
        let (protocol, path) = url
            .split_once(PROTOCOL_DELIMITER)
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;

        if protocol.is_empty() || path.is_empty() {
            return Err(StorageError::InvalidUrl(url.to_string()));
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(StorageError::InvalidUrl(format!(
                "path traversal in {url}"
            )));
        }

        Ok(Self::new(protocol, path))
    }

    /// Returns true if `url` is well formed and uses `protocol`.
    #[must_use]
    pub fn has_protocol(url: &str, protocol: &str) -> bool {
        Self::parse(url).map_or(false, |u| u.protocol == protocol)
    }
}

impl fmt::Display for ContentUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.protocol, PROTOCOL_DELIMITER, self.path)
    }
}

impl std::str::FromStr for ContentUrl {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
