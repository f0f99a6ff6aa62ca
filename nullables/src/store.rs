//! Nullable mapping store.

use rosterlink_store::{MappingStore, StoreError};
use rosterlink_types::MappingSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// An in-memory mapping store with write-failure injection.
pub struct NullMappingStore {
    persisted: Mutex<MappingSet>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl NullMappingStore {
    pub fn new() -> Self {
        Self::with_mappings(MappingSet::new())
    }

    pub fn with_mappings(mappings: MappingSet) -> Self {
        Self {
            persisted: Mutex::new(mappings),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// What a restarted process would load.
    pub fn persisted(&self) -> MappingSet {
        self.persisted.lock().unwrap().clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `replace_all` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for NullMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingStore for NullMappingStore {
    fn load(&self) -> Result<MappingSet, StoreError> {
        Ok(self.persisted())
    }

    fn replace_all(&self, mappings: &MappingSet) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("null store write failure".into()));
        }
        *self.persisted.lock().unwrap() = mappings.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
