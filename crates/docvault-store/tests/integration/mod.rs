//! Integration tests for docvault-store.
//!
//! Covers read fallback and delete semantics of the aggregating store,
//! encryption round trips over real backends, and configuration wiring.

pub mod backends;
pub mod common;
pub mod config;
pub mod encryption;
