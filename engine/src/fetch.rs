//! Snapshot fetchers with an explicit deadline.
//!
//! The HTTP clients carry their own timeouts, but any [`DirectorySource`]
//! or [`CommunityApi`] may hang; these wrappers make sure a stuck call
//! can never stall a reconciliation cycle.

use std::future::Future;
use std::time::Duration;

use rosterlink_community::{CommunityApi, CommunityError};
use rosterlink_directory::DirectorySource;
use rosterlink_types::{DirectorySnapshot, MembershipSnapshot};

use crate::FetchError;

pub async fn fetch_directory(
    source: &dyn DirectorySource,
    limit: Duration,
) -> Result<DirectorySnapshot, FetchError> {
    bounded("directory fetch", limit, source.fetch_directory()).await
}

pub async fn fetch_membership(
    community: &dyn CommunityApi,
    limit: Duration,
) -> Result<MembershipSnapshot, FetchError> {
    bounded("roster fetch", limit, community.fetch_roster()).await
}

async fn bounded<T, E, F>(
    what: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<FetchError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(FetchError::Timeout { what, after: limit }),
    }
}

/// Deadline for a single community call that is not a snapshot fetch
/// (marker grant or revoke, claim channel traffic). A timeout surfaces as
/// an unreachable API.
pub async fn bounded_call<T, F>(
    what: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, CommunityError>
where
    F: Future<Output = Result<T, CommunityError>>,
{
    tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
        Err(CommunityError::Unreachable(format!(
            "{what} timed out after {limit:?}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterlink_nullables::{NullCommunity, NullDirectory};

    #[tokio::test]
    async fn directory_fetch_returns_snapshot() {
        let directory = NullDirectory::new(["alice", "bob"]);
        let snapshot = fetch_directory(&directory, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn directory_failure_is_a_fetch_error() {
        let directory = NullDirectory::new(["alice"]);
        directory.set_failing(true);
        let err = fetch_directory(&directory, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Directory(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_directory_times_out() {
        let directory = NullDirectory::new(["alice"]);
        directory.set_hanging(true);
        let err = fetch_directory(&directory, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { what: "directory fetch", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_roster_times_out() {
        let community = NullCommunity::with_members([(1, true)]);
        community.set_roster_hanging(true);
        let err = fetch_membership(&community, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { what: "roster fetch", .. }));
    }
}
