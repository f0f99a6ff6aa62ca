use proptest::prelude::*;

use rosterlink_engine::{decide_claim, plan_reconciliation, ClaimResult, RemovalReason};
use rosterlink_types::{
    DirectorySnapshot, ExternalIdentity, MappingSet, MemberId, MemberStatus, MembershipSnapshot,
    VerificationMapping,
};

fn name(n: u8) -> ExternalIdentity {
    ExternalIdentity::new(format!("user{n}"))
}

/// Random world: stored mappings, a directory, and a roster where each
/// member is absent (0), unmarked (1) or marked (2).
fn world() -> impl Strategy<Value = (MappingSet, DirectorySnapshot, MembershipSnapshot)> {
    (
        prop::collection::btree_map(0u8..24, 0u8..24, 0..24),
        prop::collection::btree_set(0u8..24, 1..24),
        prop::collection::btree_map(0u8..24, 0u8..3, 1..24),
        any::<bool>(),
    )
        .prop_map(|(stored, directory, roster, complete)| {
            let (mappings, _) = MappingSet::from_entries(
                stored
                    .into_iter()
                    .map(|(e, m)| (name(e), MemberId::new(m as u64))),
            );
            let directory = DirectorySnapshot::new(directory.into_iter().map(name));
            let members = roster
                .into_iter()
                .filter(|(_, state)| *state > 0)
                .map(|(m, state)| (MemberId::new(m as u64), state == 2));
            let roster = if complete {
                MembershipSnapshot::complete(members)
            } else {
                MembershipSnapshot::partial(members)
            };
            (mappings, directory, roster)
        })
}

fn apply(mappings: &MappingSet, directory: &DirectorySnapshot, roster: &MembershipSnapshot) -> MappingSet {
    let plan = plan_reconciliation(directory, roster, mappings);
    let mut next = mappings.clone();
    for removal in &plan.removals {
        next.remove(&removal.mapping.external);
    }
    next
}

proptest! {
    /// A second plan over the result of the first is always empty.
    #[test]
    fn reconciliation_is_idempotent((mappings, directory, roster) in world()) {
        let once = apply(&mappings, &directory, &roster);
        let plan = plan_reconciliation(&directory, &roster, &once);
        prop_assert!(plan.is_empty());
    }

    /// Reconciliation only ever removes, and the result stays a bijection.
    #[test]
    fn reconciliation_only_removes((mappings, directory, roster) in world()) {
        let next = apply(&mappings, &directory, &roster);
        prop_assert!(next.is_consistent());
        for mapping in next.iter() {
            prop_assert!(mappings.contains(&mapping));
        }
    }

    /// Every mapping whose external left the directory is removed with
    /// that reason, and a revoke is planned exactly when the member is marked.
    #[test]
    fn directory_removals_are_always_removed((mappings, directory, roster) in world()) {
        let plan = plan_reconciliation(&directory, &roster, &mappings);
        for mapping in mappings.iter().filter(|m| !directory.contains(&m.external)) {
            let removal = plan.removals.iter().find(|r| r.mapping == mapping);
            prop_assert!(removal.is_some());
            let removal = removal.unwrap();
            prop_assert_eq!(removal.reason, RemovalReason::DirectoryRemoved);
            prop_assert_eq!(
                removal.revoke_marker,
                roster.status(mapping.member) == MemberStatus::Marked
            );
        }
    }

    /// No kept mapping points at a member without the marker.
    #[test]
    fn kept_mappings_never_lack_the_marker((mappings, directory, roster) in world()) {
        let next = apply(&mappings, &directory, &roster);
        for mapping in next.iter() {
            prop_assert_ne!(roster.status(mapping.member), MemberStatus::Unmarked);
            if roster.is_complete() {
                prop_assert_eq!(roster.status(mapping.member), MemberStatus::Marked);
            }
        }
    }

    /// Claims are only granted for accounts present in the directory, and
    /// a granted claim keeps the mapping a bijection.
    #[test]
    fn no_false_grant(
        (mappings, directory, _roster) in world(),
        claimed in 0u8..32,
        requester in 0u64..32,
    ) {
        let claimed = name(claimed);
        let result = decide_claim(&claimed, MemberId::new(requester), &directory, &mappings);
        match &result {
            ClaimResult::Granted(mapping) => {
                prop_assert!(directory.contains(&claimed));
                let mut next = mappings.clone();
                prop_assert!(next.insert(mapping.clone()).is_ok());
                prop_assert!(next.contains(&VerificationMapping::new(claimed, MemberId::new(requester))));
            }
            _ if !directory.contains(&claimed) => {
                prop_assert_eq!(&result, &ClaimResult::NotFound);
            }
            _ => {}
        }
    }
}
