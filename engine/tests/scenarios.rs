//! End-to-end behaviour of reconciliation and claims against the nullables.

use std::sync::Arc;
use std::time::Duration;

use rosterlink_engine::{
    fetch_membership, ClaimHandler, ClaimResult, EngineError, ReconciliationEngine,
    RemovalReason, RevokeOutcome, VerificationLedger,
};
use rosterlink_nullables::{NullCommunity, NullMappingStore};
use rosterlink_store::{JsonFileStore, MappingStore};
use rosterlink_types::{DirectorySnapshot, MappingSet, MemberId, VerificationMapping};

const TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mappings(entries: &[(&str, u64)]) -> MappingSet {
    entries
        .iter()
        .map(|(e, m)| VerificationMapping::new(*e, MemberId::new(*m)))
        .collect()
}

struct Harness {
    community: Arc<NullCommunity>,
    store: Arc<NullMappingStore>,
    ledger: VerificationLedger,
    engine: ReconciliationEngine,
    claims: ClaimHandler,
}

fn harness(members: &[(u64, bool)], stored: &[(&str, u64)]) -> Harness {
    let community = Arc::new(NullCommunity::with_members(members.iter().copied()));
    let store = Arc::new(NullMappingStore::with_mappings(mappings(stored)));
    let ledger = VerificationLedger::open(store.clone()).unwrap();
    Harness {
        engine: ReconciliationEngine::new(community.clone(), TIMEOUT),
        claims: ClaimHandler::new(community.clone(), TIMEOUT),
        community,
        store,
        ledger,
    }
}

impl Harness {
    async fn reconcile(
        &self,
        directory: &DirectorySnapshot,
    ) -> Result<rosterlink_engine::ReconciliationReport, EngineError> {
        self.engine.reconcile(directory, &self.ledger).await
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_consistent_state_is_left_alone() {
    let h = harness(&[(42, true), (99, true)], &[("alice", 42), ("bob", 99)]);
    let directory = DirectorySnapshot::new(["alice", "bob"]);

    let report = h.reconcile(&directory).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.remaining, 2);
    assert_eq!(h.store.persisted(), mappings(&[("alice", 42), ("bob", 99)]));
    assert_eq!(h.store.write_count(), 0);
    assert!(h.community.revokes().is_empty());
}

#[tokio::test]
async fn scenario_b_directory_removal_unmarks_and_drops() {
    let h = harness(&[(42, true), (99, true)], &[("alice", 42), ("bob", 99)]);
    let directory = DirectorySnapshot::new(["bob"]);

    let report = h.reconcile(&directory).await.unwrap();

    assert_eq!(report.corrections.len(), 1);
    let correction = &report.corrections[0];
    assert_eq!(correction.mapping, VerificationMapping::new("alice", MemberId::new(42)));
    assert_eq!(correction.reason, RemovalReason::DirectoryRemoved);
    assert_eq!(correction.revoke, Some(RevokeOutcome::Revoked));

    assert_eq!(h.community.revokes(), vec![MemberId::new(42)]);
    assert!(!h.community.has_marker(MemberId::new(42)));
    assert_eq!(h.store.persisted(), mappings(&[("bob", 99)]));
    assert_eq!(*h.ledger.snapshot(), mappings(&[("bob", 99)]));
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let h = harness(
        &[(42, true), (99, false)],
        &[("alice", 42), ("bob", 99), ("carol", 7)],
    );
    let directory = DirectorySnapshot::new(["bob", "carol"]);

    let first = h.reconcile(&directory).await.unwrap();
    assert_eq!(first.corrections.len(), 3);
    let writes = h.store.write_count();

    let second = h.reconcile(&directory).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(h.store.write_count(), writes);
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn failed_revoke_still_drops_mapping() {
    let h = harness(&[(42, true)], &[("alice", 42)]);
    h.community.fail_revokes_for(MemberId::new(42));

    let report = h.reconcile(&DirectorySnapshot::new(["bob"])).await.unwrap();

    assert_eq!(report.revoke_failures(), 1);
    assert!(matches!(
        report.corrections[0].revoke,
        Some(RevokeOutcome::Failed(_))
    ));
    assert!(h.store.persisted().is_empty());
}

#[tokio::test]
async fn member_who_left_is_dropped_without_revoke() {
    let h = harness(&[(99, true)], &[("alice", 42), ("bob", 99)]);

    let report = h
        .reconcile(&DirectorySnapshot::new(["alice", "bob"]))
        .await
        .unwrap();

    assert_eq!(report.corrections.len(), 1);
    assert_eq!(report.corrections[0].reason, RemovalReason::LeftCommunity);
    assert_eq!(report.corrections[0].revoke, None);
    assert!(h.community.revokes().is_empty());
    assert_eq!(h.store.persisted(), mappings(&[("bob", 99)]));
}

#[tokio::test]
async fn manually_stripped_marker_drops_mapping() {
    let h = harness(&[(42, true)], &[("alice", 42)]);
    h.community.strip_marker(MemberId::new(42));

    let report = h.reconcile(&DirectorySnapshot::new(["alice"])).await.unwrap();

    assert_eq!(report.corrections[0].reason, RemovalReason::MarkerMissing);
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn truncated_roster_keeps_unseen_members() {
    let h = harness(&[(99, true)], &[("alice", 42), ("bob", 99)]);
    h.community.set_truncated(true);

    let report = h
        .reconcile(&DirectorySnapshot::new(["alice", "bob"]))
        .await
        .unwrap();

    assert!(report.is_empty());
    assert_eq!(report.unverifiable, 1);
    assert_eq!(h.ledger.len(), 2);
}

#[tokio::test]
async fn persistence_failure_fails_the_pass_and_rolls_back() {
    let h = harness(&[(42, true), (99, true)], &[("alice", 42), ("bob", 99)]);
    h.store.set_fail_writes(true);
    let directory = DirectorySnapshot::new(["bob"]);

    let err = h.reconcile(&directory).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert_eq!(*h.ledger.snapshot(), mappings(&[("alice", 42), ("bob", 99)]));

    // The revoke already happened; the retry drops the mapping either way.
    h.store.set_fail_writes(false);
    let report = h.reconcile(&directory).await.unwrap();
    assert_eq!(report.corrections.len(), 1);
    assert_eq!(report.corrections[0].reason, RemovalReason::DirectoryRemoved);
    assert_eq!(h.store.persisted(), mappings(&[("bob", 99)]));
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_c_free_account_is_granted() {
    let h = harness(&[(7, false)], &[]);
    let directory = DirectorySnapshot::new(["carol"]);

    let result = h
        .claims
        .handle_claim(&"carol".into(), MemberId::new(7), &directory, &h.ledger)
        .await
        .unwrap();

    assert_eq!(
        result,
        ClaimResult::Granted(VerificationMapping::new("carol", MemberId::new(7)))
    );
    assert_eq!(h.store.persisted(), mappings(&[("carol", 7)]));
    assert_eq!(h.community.grants(), vec![MemberId::new(7)]);
    assert!(h.community.has_marker(MemberId::new(7)));
}

#[tokio::test]
async fn scenario_d_mapped_account_is_already_verified() {
    let h = harness(&[(7, true), (8, false)], &[("carol", 7)]);
    let directory = DirectorySnapshot::new(["carol"]);

    let result = h
        .claims
        .handle_claim(&"carol".into(), MemberId::new(8), &directory, &h.ledger)
        .await
        .unwrap();

    assert_eq!(result, ClaimResult::AlreadyVerified);
    assert_eq!(h.store.persisted(), mappings(&[("carol", 7)]));
    assert_eq!(h.store.write_count(), 0);
    assert!(h.community.grants().is_empty());
}

#[tokio::test]
async fn scenario_e_unknown_account_is_not_found() {
    let h = harness(&[(9, false)], &[]);
    let directory = DirectorySnapshot::new(["carol"]);

    let result = h
        .claims
        .handle_claim(&"dave".into(), MemberId::new(9), &directory, &h.ledger)
        .await
        .unwrap();

    assert_eq!(result, ClaimResult::NotFound);
    assert!(h.ledger.is_empty());
    assert!(h.community.grants().is_empty());
}

#[tokio::test]
async fn failed_grant_reverts_the_mapping() {
    let h = harness(&[(7, false)], &[]);
    h.community.fail_grants_for(MemberId::new(7));
    let directory = DirectorySnapshot::new(["carol"]);

    let err = h
        .claims
        .handle_claim(&"carol".into(), MemberId::new(7), &directory, &h.ledger)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::MarkerGrant { member, .. } if member == MemberId::new(7)));
    assert!(h.ledger.is_empty());
    assert!(h.store.persisted().is_empty());

    // Nothing was left behind, so the member can simply try again.
    let retry = Arc::new(NullCommunity::with_members([(7, false)]));
    let handler = ClaimHandler::new(retry.clone(), TIMEOUT);
    let result = handler
        .handle_claim(&"carol".into(), MemberId::new(7), &directory, &h.ledger)
        .await
        .unwrap();
    assert!(result.is_granted());
}

#[tokio::test]
async fn store_failure_on_claim_grants_nothing() {
    let h = harness(&[(7, false)], &[]);
    h.store.set_fail_writes(true);

    let err = h
        .claims
        .handle_claim(
            &"carol".into(),
            MemberId::new(7),
            &DirectorySnapshot::new(["carol"]),
            &h.ledger,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(h.community.grants().is_empty());
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn granted_claim_survives_reconciliation() {
    let h = harness(&[(7, false)], &[]);
    let directory = DirectorySnapshot::new(["carol"]);

    h.claims
        .handle_claim(&"carol".into(), MemberId::new(7), &directory, &h.ledger)
        .await
        .unwrap();
    let report = h.reconcile(&directory).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(h.ledger.len(), 1);
}

#[tokio::test]
async fn claim_granted_after_the_roster_was_read_is_kept() {
    let h = harness(&[(42, true), (7, false)], &[("alice", 42)]);
    let directory = DirectorySnapshot::new(["alice", "carol"]);

    let baseline = h.ledger.snapshot();
    let stale_roster = fetch_membership(h.community.as_ref(), TIMEOUT).await.unwrap();
    let result = h
        .claims
        .handle_claim(&"carol".into(), MemberId::new(7), &directory, &h.ledger)
        .await
        .unwrap();
    assert!(result.is_granted());

    let report = h
        .engine
        .apply(&directory, &stale_roster, &baseline, &h.ledger)
        .await
        .unwrap();

    assert!(report.is_empty());
    assert_eq!(h.store.persisted(), mappings(&[("alice", 42), ("carol", 7)]));
    assert!(h.community.has_marker(MemberId::new(7)));
}

#[tokio::test]
async fn stale_roster_still_removes_baseline_mappings() {
    let h = harness(&[(42, false), (7, false)], &[("alice", 42)]);
    let directory = DirectorySnapshot::new(["alice", "carol"]);

    let baseline = h.ledger.snapshot();
    let stale_roster = fetch_membership(h.community.as_ref(), TIMEOUT).await.unwrap();
    h.claims
        .handle_claim(&"carol".into(), MemberId::new(7), &directory, &h.ledger)
        .await
        .unwrap();

    let report = h
        .engine
        .apply(&directory, &stale_roster, &baseline, &h.ledger)
        .await
        .unwrap();

    assert_eq!(report.corrections.len(), 1);
    assert_eq!(report.corrections[0].reason, RemovalReason::MarkerMissing);
    assert_eq!(h.store.persisted(), mappings(&[("carol", 7)]));
}

#[tokio::test(start_paused = true)]
async fn hung_grant_times_out_and_reverts() {
    let h = harness(&[(7, false)], &[]);
    h.community.set_grant_hanging(true);
    let directory = DirectorySnapshot::new(["carol"]);

    let err = h
        .claims
        .handle_claim(&"carol".into(), MemberId::new(7), &directory, &h.ledger)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::MarkerGrant { .. }));
    assert!(h.ledger.is_empty());
    assert!(h.store.persisted().is_empty());
    assert!(!h.community.has_marker(MemberId::new(7)));
}

#[tokio::test(start_paused = true)]
async fn hung_revoke_times_out_and_still_removes() {
    let h = harness(&[(42, true), (99, true)], &[("alice", 42), ("bob", 99)]);
    h.community.set_revoke_hanging(true);

    let report = h.reconcile(&DirectorySnapshot::new(["bob"])).await.unwrap();

    assert_eq!(report.corrections.len(), 1);
    assert!(matches!(
        report.corrections[0].revoke,
        Some(RevokeOutcome::Failed(_))
    ));
    assert_eq!(h.store.persisted(), mappings(&[("bob", 99)]));
}

#[tokio::test]
async fn concurrent_claims_for_same_account_grant_once() {
    let community = Arc::new(NullCommunity::with_members([(7, false), (8, false)]));
    let store = Arc::new(NullMappingStore::new());
    let ledger = Arc::new(VerificationLedger::open(store.clone()).unwrap());
    let handler = Arc::new(ClaimHandler::new(community.clone(), TIMEOUT));
    let directory = Arc::new(DirectorySnapshot::new(["carol"]));

    let mut tasks = Vec::new();
    for member in [7u64, 8] {
        let (ledger, handler, directory) =
            (Arc::clone(&ledger), Arc::clone(&handler), Arc::clone(&directory));
        tasks.push(tokio::spawn(async move {
            handler
                .handle_claim(&"carol".into(), MemberId::new(member), &directory, &ledger)
                .await
                .unwrap()
        }));
    }

    let mut granted = 0;
    for task in tasks {
        if task.await.unwrap().is_granted() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(store.persisted().len(), 1);
    assert_eq!(community.grants().len(), 1);
}

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mappings_survive_restart_through_json_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_users.json");
    let community = Arc::new(NullCommunity::with_members([(7, false)]));
    let directory = DirectorySnapshot::new(["carol"]);

    {
        let ledger = VerificationLedger::open(Arc::new(JsonFileStore::new(&path))).unwrap();
        ClaimHandler::new(community.clone(), TIMEOUT)
            .handle_claim(&"carol".into(), MemberId::new(7), &directory, &ledger)
            .await
            .unwrap();
    }

    let reloaded = JsonFileStore::new(&path).load().unwrap();
    assert_eq!(reloaded, mappings(&[("carol", 7)]));
}
