//! Reconciliation: restore agreement between the mapping and both directories.
//!
//! For every stored mapping the first matching rule wins:
//!
//! 1. the external identity is gone from the directory: strip the marker
//!    if the member still holds it (best effort), drop the mapping;
//! 2. the member is gone from the roster: drop the mapping;
//! 3. the member is present without the marker: drop the mapping;
//! 4. otherwise the mapping is consistent and kept.
//!
//! Rule 2 only fires on a complete roster. When the roster fetch may have
//! been truncated, absence proves nothing and the mapping is kept until a
//! complete roster says otherwise.
//!
//! Planning is pure ([`plan_reconciliation`]); [`ReconciliationEngine`]
//! applies a plan inside one ledger transaction and commits all removals
//! as a single write. The plan is made against the mappings as they were
//! before the roster was fetched, so claims granted meanwhile are kept.

use std::sync::Arc;
use std::time::Duration;

use rosterlink_community::CommunityApi;
use rosterlink_types::{
    DirectorySnapshot, MappingSet, MemberStatus, MembershipSnapshot, VerificationMapping,
};

use crate::fetch::{bounded_call, fetch_membership};
use crate::{EngineError, VerificationLedger};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// The external identity no longer exists in the directory.
    DirectoryRemoved,
    /// The member left the community.
    LeftCommunity,
    /// The member no longer holds the verified marker.
    MarkerMissing,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectoryRemoved => "directory_removed",
            Self::LeftCommunity => "left_community",
            Self::MarkerMissing => "marker_missing",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedRemoval {
    pub mapping: VerificationMapping,
    pub reason: RemovalReason,
    /// Whether the member still holds the marker and it should be stripped.
    pub revoke_marker: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub removals: Vec<PlannedRemoval>,
    /// Mappings kept only because the roster was incomplete.
    pub unverifiable: usize,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }
}

/// Compute the corrections needed to make `mappings` agree with both snapshots.
pub fn plan_reconciliation(
    directory: &DirectorySnapshot,
    membership: &MembershipSnapshot,
    mappings: &MappingSet,
) -> ReconciliationPlan {
    let roster_complete = membership.is_complete();
    let mut plan = ReconciliationPlan::default();

    for mapping in mappings.iter() {
        let status = membership.status(mapping.member);

        let removal = if !directory.contains(&mapping.external) {
            Some((RemovalReason::DirectoryRemoved, status == MemberStatus::Marked))
        } else {
            match status {
                MemberStatus::Absent if roster_complete => {
                    Some((RemovalReason::LeftCommunity, false))
                }
                MemberStatus::Absent => {
                    plan.unverifiable += 1;
                    None
                }
                MemberStatus::Unmarked => Some((RemovalReason::MarkerMissing, false)),
                MemberStatus::Marked => None,
            }
        };

        if let Some((reason, revoke_marker)) = removal {
            plan.removals.push(PlannedRemoval {
                mapping,
                reason,
                revoke_marker,
            });
        }
    }
    plan
}

/// What happened to a best-effort marker revoke.
///
/// Callers may inspect it; a failure never fails the pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correction {
    pub mapping: VerificationMapping,
    pub reason: RemovalReason,
    /// `None` when no revoke was needed.
    pub revoke: Option<RevokeOutcome>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub corrections: Vec<Correction>,
    pub unverifiable: usize,
    /// Mappings left after the pass.
    pub remaining: usize,
}

impl ReconciliationReport {
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    pub fn revoke_failures(&self) -> usize {
        self.corrections
            .iter()
            .filter(|c| matches!(c.revoke, Some(RevokeOutcome::Failed(_))))
            .count()
    }
}

/// Applies reconciliation plans against the live community.
pub struct ReconciliationEngine {
    community: Arc<dyn CommunityApi>,
    call_timeout: Duration,
    roster_timeout: Duration,
}

impl ReconciliationEngine {
    pub fn new(community: Arc<dyn CommunityApi>, call_timeout: Duration) -> Self {
        Self {
            community,
            call_timeout,
            roster_timeout: call_timeout,
        }
    }

    /// Deadline for the whole paginated roster fetch. Defaults to the
    /// per-call timeout.
    pub fn with_roster_timeout(mut self, roster_timeout: Duration) -> Self {
        self.roster_timeout = roster_timeout;
        self
    }

    /// Fetch the roster and run one reconciliation pass.
    ///
    /// The ledger is read before the roster, so a claim granted while the
    /// roster is in flight is never judged against a roster that predates
    /// it.
    pub async fn reconcile(
        &self,
        directory: &DirectorySnapshot,
        ledger: &VerificationLedger,
    ) -> Result<ReconciliationReport, EngineError> {
        let baseline = ledger.snapshot();
        let membership = fetch_membership(self.community.as_ref(), self.roster_timeout).await?;
        self.apply(directory, &membership, &baseline, ledger).await
    }

    /// Apply one pass for a roster observed after `baseline` was read.
    ///
    /// Only mappings in `baseline` are judged; anything added since is
    /// left for the next pass. Holds the ledger's writer lock from
    /// planning through commit. All removals are written in one
    /// `replace_all`; if that fails the pass fails as a whole and the
    /// ledger stays at its last persisted state.
    pub async fn apply(
        &self,
        directory: &DirectorySnapshot,
        membership: &MembershipSnapshot,
        baseline: &MappingSet,
        ledger: &VerificationLedger,
    ) -> Result<ReconciliationReport, EngineError> {
        let mut txn = ledger.begin().await;
        let mut plan = plan_reconciliation(directory, membership, baseline);

        // A baseline mapping can only have changed under a concurrent pass.
        let current = txn.current();
        plan.removals.retain(|removal| {
            current.member_for(&removal.mapping.external) == Some(removal.mapping.member)
        });

        if plan.unverifiable > 0 {
            tracing::warn!(
                kept = plan.unverifiable,
                "roster incomplete, keeping mappings for members not seen"
            );
        }
        if plan.is_empty() {
            return Ok(ReconciliationReport {
                corrections: Vec::new(),
                unverifiable: plan.unverifiable,
                remaining: txn.current().len(),
            });
        }

        let mut next = txn.current().clone();
        let mut corrections = Vec::with_capacity(plan.removals.len());
        for removal in plan.removals {
            let revoke = if removal.revoke_marker {
                Some(self.revoke(&removal.mapping).await)
            } else {
                None
            };
            tracing::info!(
                external = %removal.mapping.external,
                member = %removal.mapping.member,
                reason = removal.reason.as_str(),
                "removing mapping"
            );
            next.remove(&removal.mapping.external);
            corrections.push(Correction {
                mapping: removal.mapping,
                reason: removal.reason,
                revoke,
            });
        }

        let remaining = next.len();
        txn.commit(next)?;

        Ok(ReconciliationReport {
            corrections,
            unverifiable: plan.unverifiable,
            remaining,
        })
    }

    async fn revoke(&self, mapping: &VerificationMapping) -> RevokeOutcome {
        let call = self.community.revoke_marker(mapping.member);
        match bounded_call("marker revoke", self.call_timeout, call).await {
            Ok(()) => RevokeOutcome::Revoked,
            Err(e) => {
                tracing::warn!(
                    member = %mapping.member,
                    external = %mapping.external,
                    error = %e,
                    "can't unverify member, removing mapping regardless"
                );
                RevokeOutcome::Failed(e.to_string())
            }
        }
    }
}
