use std::time::Duration;

use rosterlink_community::CommunityError;
use rosterlink_directory::DirectoryError;
use rosterlink_store::StoreError;
use rosterlink_types::MemberId;
use thiserror::Error;

/// A snapshot could not be fetched. The cycle is abandoned and retried whole.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("directory fetch failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("roster fetch failed: {0}")]
    Roster(#[from] CommunityError),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("persisting mappings failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("granting the verified marker to member {member} failed: {source}")]
    MarkerGrant {
        member: MemberId,
        #[source]
        source: CommunityError,
    },

    #[error("no directory snapshot has been fetched yet")]
    DirectoryUnavailable,
}
