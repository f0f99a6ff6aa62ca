//! Nullable media-server directory.

use async_trait::async_trait;
use rosterlink_directory::{DirectoryError, DirectorySource};
use rosterlink_types::{DirectorySnapshot, ExternalIdentity};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// An in-memory user directory.
pub struct NullDirectory {
    users: Mutex<BTreeSet<ExternalIdentity>>,
    failing: AtomicBool,
    hanging: AtomicBool,
    fetches: AtomicUsize,
}

impl NullDirectory {
    pub fn new<I, T>(users: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ExternalIdentity>,
    {
        Self {
            users: Mutex::new(users.into_iter().map(Into::into).collect()),
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn add_user(&self, name: &str) {
        self.users.lock().unwrap().insert(name.into());
    }

    pub fn remove_user(&self, name: &str) {
        self.users.lock().unwrap().remove(&ExternalIdentity::from(name));
    }

    /// Make every fetch fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every fetch wait forever until reset.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for NullDirectory {
    fn default() -> Self {
        Self::new(Vec::<ExternalIdentity>::new())
    }
}

#[async_trait]
impl DirectorySource for NullDirectory {
    async fn fetch_directory(&self) -> Result<DirectorySnapshot, DirectoryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unreachable("null directory offline".into()));
        }
        let users = self.users.lock().unwrap();
        if users.is_empty() {
            return Err(DirectoryError::Empty);
        }
        Ok(DirectorySnapshot::new(users.iter().cloned()))
    }
}
