//! The verification ledger: the in-memory mapping plus its store.
//!
//! All mutation goes through a [`LedgerTxn`], which holds the ledger's
//! single writer lock for its whole read-modify-write sequence, including
//! any network calls made in between. Reconciliation passes and claims
//! therefore never interleave on the same records.
//!
//! The published set only changes after the store accepted the new set,
//! so a failed write leaves memory at the last persisted state and the
//! next pass recomputes from truth.

use std::sync::{Arc, RwLock};

use rosterlink_store::{MappingStore, StoreError};
use rosterlink_types::MappingSet;
use tokio::sync::{Mutex, MutexGuard};

pub struct VerificationLedger {
    store: Arc<dyn MappingStore>,
    writer: Mutex<()>,
    published: RwLock<Arc<MappingSet>>,
}

impl VerificationLedger {
    /// Load the persisted set and take ownership of the store.
    pub fn open(store: Arc<dyn MappingStore>) -> Result<Self, StoreError> {
        let mappings = store.load()?;
        tracing::info!(mappings = mappings.len(), "verification ledger opened");
        Ok(Self {
            store,
            writer: Mutex::new(()),
            published: RwLock::new(Arc::new(mappings)),
        })
    }

    /// The last committed set. Never blocks on an open transaction.
    pub fn snapshot(&self) -> Arc<MappingSet> {
        Arc::clone(&self.published.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Wait for the writer lock and start a transaction.
    pub async fn begin(&self) -> LedgerTxn<'_> {
        let guard = self.writer.lock().await;
        LedgerTxn {
            _guard: guard,
            ledger: self,
            base: self.snapshot(),
        }
    }

    fn publish(&self, mappings: MappingSet) {
        let mut slot = self.published.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(mappings);
    }
}

/// Exclusive write access to a [`VerificationLedger`].
///
/// Dropping a transaction without committing leaves the ledger untouched.
pub struct LedgerTxn<'a> {
    _guard: MutexGuard<'a, ()>,
    ledger: &'a VerificationLedger,
    base: Arc<MappingSet>,
}

impl LedgerTxn<'_> {
    /// The set as of the last commit.
    pub fn current(&self) -> &MappingSet {
        &self.base
    }

    /// Persist `next` and, only if that succeeds, make it current.
    pub fn commit(&mut self, next: MappingSet) -> Result<(), StoreError> {
        self.ledger.store.replace_all(&next)?;
        self.base = Arc::new(next.clone());
        self.ledger.publish(next);
        Ok(())
    }

    /// Undo an earlier commit in this transaction.
    ///
    /// `previous` becomes current in memory even if persisting it fails,
    /// so the process never acts on a mapping it is rolling back. The
    /// error is returned for logging; the next successful commit rewrites
    /// the store from memory.
    pub fn revert(&mut self, previous: MappingSet) -> Result<(), StoreError> {
        let persisted = self.ledger.store.replace_all(&previous);
        self.base = Arc::new(previous.clone());
        self.ledger.publish(previous);
        persisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterlink_nullables::NullMappingStore;
    use rosterlink_types::{MemberId, VerificationMapping};

    fn set(entries: &[(&str, u64)]) -> MappingSet {
        entries
            .iter()
            .map(|(e, m)| VerificationMapping::new(*e, MemberId::new(*m)))
            .collect()
    }

    #[tokio::test]
    async fn open_loads_persisted_mappings() {
        let store = Arc::new(NullMappingStore::with_mappings(set(&[("alice", 42)])));
        let ledger = VerificationLedger::open(store).unwrap();
        assert_eq!(*ledger.snapshot(), set(&[("alice", 42)]));
    }

    #[tokio::test]
    async fn commit_persists_then_publishes() {
        let store = Arc::new(NullMappingStore::new());
        let ledger = VerificationLedger::open(store.clone()).unwrap();

        let mut txn = ledger.begin().await;
        txn.commit(set(&[("alice", 42)])).unwrap();
        drop(txn);

        assert_eq!(store.persisted(), set(&[("alice", 42)]));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_keeps_last_persisted_state() {
        let store = Arc::new(NullMappingStore::with_mappings(set(&[("alice", 42)])));
        let ledger = VerificationLedger::open(store.clone()).unwrap();
        store.set_fail_writes(true);

        let mut txn = ledger.begin().await;
        assert!(txn.commit(MappingSet::new()).is_err());
        assert_eq!(*txn.current(), set(&[("alice", 42)]));
        drop(txn);

        assert_eq!(*ledger.snapshot(), set(&[("alice", 42)]));
    }

    #[tokio::test]
    async fn revert_publishes_even_when_the_write_fails() {
        let store = Arc::new(NullMappingStore::new());
        let ledger = VerificationLedger::open(store.clone()).unwrap();

        let mut txn = ledger.begin().await;
        txn.commit(set(&[("alice", 42)])).unwrap();
        store.set_fail_writes(true);
        assert!(txn.revert(MappingSet::new()).is_err());
        drop(txn);

        assert!(ledger.is_empty());
        assert_eq!(store.persisted(), set(&[("alice", 42)]));
    }

    #[tokio::test]
    async fn snapshot_does_not_wait_for_open_transaction() {
        let store = Arc::new(NullMappingStore::with_mappings(set(&[("alice", 42)])));
        let ledger = VerificationLedger::open(store).unwrap();

        let _txn = ledger.begin().await;
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn writers_are_serialized() {
        let store = Arc::new(NullMappingStore::new());
        let ledger = Arc::new(VerificationLedger::open(store).unwrap());

        let txn = ledger.begin().await;
        let contender = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let mut txn = ledger.begin().await;
                let mut next = txn.current().clone();
                next.insert(VerificationMapping::new("bob", MemberId::new(99)))
                    .unwrap();
                txn.commit(next).unwrap();
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(txn);
        contender.await.unwrap();
        assert_eq!(ledger.len(), 1);
    }
}
