//! Common test utilities.

pub mod helpers;
pub mod mocks;

pub use helpers::*;
pub use mocks::*;
