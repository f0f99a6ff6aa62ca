//! Verification claims: "I am directory account X".
//!
//! A claim is checked against the most recent directory snapshot and the
//! ledger, in priority order:
//!
//! 1. `NotFound`: the directory has no such account;
//! 2. `AlreadyVerified`: the account is already mapped, to anyone,
//!    including the requester;
//! 3. `RequesterAlreadyVerified`: the requester is mapped to another
//!    account (one verified account per member);
//! 4. `Granted`: the mapping is persisted, then the marker granted.
//!
//! The mapping write and the marker grant succeed together or not at all:
//! if the grant fails the mapping is reverted, so the store is never ahead
//! of the community.

use std::sync::Arc;
use std::time::Duration;

use rosterlink_community::CommunityApi;
use rosterlink_types::{
    DirectorySnapshot, ExternalIdentity, MappingConflict, MappingSet, MemberId,
    VerificationMapping,
};

use crate::fetch::bounded_call;
use crate::{EngineError, VerificationLedger};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimResult {
    /// Mapping recorded and marker granted.
    Granted(VerificationMapping),
    NotFound,
    AlreadyVerified,
    RequesterAlreadyVerified { existing: ExternalIdentity },
}

impl ClaimResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted(_) => "granted",
            Self::NotFound => "not_found",
            Self::AlreadyVerified => "already_verified",
            Self::RequesterAlreadyVerified { .. } => "requester_already_verified",
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Decide a claim without side effects.
pub fn decide_claim(
    claimed: &ExternalIdentity,
    requester: MemberId,
    directory: &DirectorySnapshot,
    mappings: &MappingSet,
) -> ClaimResult {
    if !directory.contains(claimed) {
        return ClaimResult::NotFound;
    }
    if mappings.member_for(claimed).is_some() {
        return ClaimResult::AlreadyVerified;
    }
    if let Some(existing) = mappings.external_for(requester) {
        return ClaimResult::RequesterAlreadyVerified {
            existing: existing.clone(),
        };
    }
    ClaimResult::Granted(VerificationMapping {
        external: claimed.clone(),
        member: requester,
    })
}

pub struct ClaimHandler {
    community: Arc<dyn CommunityApi>,
    call_timeout: Duration,
}

impl ClaimHandler {
    pub fn new(community: Arc<dyn CommunityApi>, call_timeout: Duration) -> Self {
        Self {
            community,
            call_timeout,
        }
    }

    /// Process one claim under the ledger's writer lock.
    ///
    /// Rejections are `Ok` values. `Err` means the claim could not be
    /// completed and nothing changed: the write failed, or the grant
    /// failed and the write was reverted.
    pub async fn handle_claim(
        &self,
        claimed: &ExternalIdentity,
        requester: MemberId,
        directory: &DirectorySnapshot,
        ledger: &VerificationLedger,
    ) -> Result<ClaimResult, EngineError> {
        let mut txn = ledger.begin().await;
        let previous = txn.current().clone();

        let mapping = match decide_claim(claimed, requester, directory, &previous) {
            ClaimResult::Granted(mapping) => mapping,
            rejected => {
                tracing::warn!(
                    %requester,
                    external = %claimed,
                    outcome = rejected.as_str(),
                    "verification claim rejected"
                );
                return Ok(rejected);
            }
        };

        let mut next = previous.clone();
        if let Err(conflict) = next.insert(mapping.clone()) {
            return Ok(match conflict {
                MappingConflict::ExternalTaken { .. } => ClaimResult::AlreadyVerified,
                MappingConflict::MemberTaken { external, .. } => {
                    ClaimResult::RequesterAlreadyVerified { existing: external }
                }
            });
        }

        tracing::info!(%requester, external = %claimed, "adding verified member");
        txn.commit(next)?;

        let grant = self.community.grant_marker(requester);
        if let Err(source) = bounded_call("marker grant", self.call_timeout, grant).await {
            if let Err(e) = txn.revert(previous) {
                tracing::error!(
                    %requester,
                    external = %claimed,
                    error = %e,
                    "failed to persist rollback of ungranted mapping"
                );
            }
            return Err(EngineError::MarkerGrant {
                member: requester,
                source,
            });
        }

        tracing::info!(%requester, external = %claimed, "added verified member");
        Ok(ClaimResult::Granted(mapping))
    }
}
