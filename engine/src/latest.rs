//! The most recently fetched directory snapshot.
//!
//! Written by the scheduler after every successful directory fetch and read
//! by claim handling, which never fetches on its own. Claims therefore see
//! a directory that is at most one scheduler period old.

use std::sync::{Arc, RwLock};

use rosterlink_types::DirectorySnapshot;

#[derive(Default)]
pub struct LatestDirectory {
    inner: RwLock<Option<Arc<DirectorySnapshot>>>,
}

impl LatestDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: DirectorySnapshot) -> Arc<DirectorySnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn get(&self) -> Option<Arc<DirectorySnapshot>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
