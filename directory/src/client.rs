//! HTTP client for the media server's `/Users` endpoint.

use async_trait::async_trait;
use rosterlink_types::DirectorySnapshot;
use serde::Deserialize;
use std::time::Duration;

use crate::{DirectoryError, DirectorySource};

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the media server's user directory.
///
/// Sends `GET {base_url}/Users` with a static API token and keeps only
/// each account's `Name`.
pub struct MediaServerClient {
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
    base_url: String,
    token: String,
}

/// One entry of the `/Users` response. Every other field is ignored.
#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(rename = "Name")]
    name: String,
}

impl MediaServerClient {
    /// Create a client with the given request timeout.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| DirectoryError::Other(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn users_url(&self) -> String {
        format!("{}/Users", self.base_url.trim_end_matches('/'))
    }

    fn auth_header(&self) -> String {
        format!("MediaBrowser Token=\"{}\"", self.token)
    }
}

#[async_trait]
impl DirectorySource for MediaServerClient {
    async fn fetch_directory(&self) -> Result<DirectorySnapshot, DirectoryError> {
        tracing::debug!("fetching media server users");
        let response = self
            .http_client
            .get(self.users_url())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DirectoryError::Unreachable(format!("request timed out: {e}"))
                } else if e.is_connect() {
                    DirectoryError::Unreachable(format!("connection failed: {e}"))
                } else {
                    DirectoryError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(DirectoryError::RequestFailed(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        let records: Vec<UserRecord> = response.json().await.map_err(|e| {
            DirectoryError::InvalidResponse(format!("failed to parse user list: {e}"))
        })?;

        let snapshot = snapshot_from_records(records)?;
        tracing::debug!(users = snapshot.len(), "fetched media server users");
        Ok(snapshot)
    }
}

/// An empty list is refused: the server always has at least its admin
/// account, so zero users means a broken response, not a wiped directory.
fn snapshot_from_records(records: Vec<UserRecord>) -> Result<DirectorySnapshot, DirectoryError> {
    if records.is_empty() {
        return Err(DirectoryError::Empty);
    }
    Ok(DirectorySnapshot::new(records.into_iter().map(|r| r.name)))
}
