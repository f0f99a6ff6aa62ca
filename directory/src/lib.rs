//! Media-server user directory.
//!
//! The directory is read-only from rosterlink's point of view: it is
//! fetched wholesale as a [`DirectorySnapshot`] and never written to.
//! Only each account's display name matters; it is the external identity
//! members claim in the verification channel.

pub mod client;
pub mod error;

pub use client::MediaServerClient;
pub use error::DirectoryError;

use async_trait::async_trait;
use rosterlink_types::DirectorySnapshot;

/// Anything that can produce a fresh directory snapshot.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Fetch every account name currently known to the directory.
    async fn fetch_directory(&self) -> Result<DirectorySnapshot, DirectoryError>;
}
