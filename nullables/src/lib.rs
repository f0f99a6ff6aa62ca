//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the bridge (media-server directory, chat
//! community, mapping file) sits behind a trait. This crate provides
//! in-memory implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically, including failure injection
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod community;
pub mod directory;
pub mod store;

pub use community::NullCommunity;
pub use directory::NullDirectory;
pub use store::NullMappingStore;
