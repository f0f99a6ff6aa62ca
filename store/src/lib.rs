//! Persistence boundary for the verification mapping.
//!
//! Every backend implements [`MappingStore`]. The rest of the codebase
//! depends only on the trait; the only production backend is the JSON
//! file in [`json`].

pub mod error;
pub mod json;

pub use error::StoreError;
pub use json::JsonFileStore;

use rosterlink_types::MappingSet;

/// Durable storage for the full mapping set.
///
/// The store is written wholesale: there is no per-record update. Callers
/// are responsible for serializing writers; implementations only promise
/// that a successful [`replace_all`](MappingStore::replace_all) survives a
/// process restart and that a failed one leaves the previous contents intact.
pub trait MappingStore: Send + Sync {
    /// Read the last persisted mapping set.
    fn load(&self) -> Result<MappingSet, StoreError>;

    /// Atomically replace the persisted set with `mappings`.
    fn replace_all(&self, mappings: &MappingSet) -> Result<(), StoreError>;
}
