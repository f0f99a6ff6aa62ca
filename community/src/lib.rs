//! Chat community side of the bridge.
//!
//! Two seams are exposed:
//! - [`CommunityApi`]: the roster and the verified role marker, used by the
//!   reconciliation engine and the claim handler.
//! - [`ClaimChannel`]: the verification channel where members post claims,
//!   plus private replies to them.
//!
//! [`ChatClient`] implements both over the platform's REST API.

pub mod client;
pub mod error;
pub mod message;
mod wire;

pub use client::{ChatClient, ChatSettings};
pub use error::CommunityError;
pub use message::{ChannelMessage, MessageId};

use async_trait::async_trait;
use rosterlink_types::{MemberId, MembershipSnapshot};

/// Roster queries and verified-marker mutations.
#[async_trait]
pub trait CommunityApi: Send + Sync {
    /// Fetch the current roster and who holds the verified marker.
    async fn fetch_roster(&self) -> Result<MembershipSnapshot, CommunityError>;

    /// Give `member` the verified marker.
    async fn grant_marker(&self, member: MemberId) -> Result<(), CommunityError>;

    /// Take the verified marker away from `member`.
    async fn revoke_marker(&self, member: MemberId) -> Result<(), CommunityError>;
}

/// The verification channel and private replies.
#[async_trait]
pub trait ClaimChannel: Send + Sync {
    /// Messages posted after `after` (or the most recent batch when `None`),
    /// oldest first.
    async fn poll_messages(
        &self,
        after: Option<MessageId>,
    ) -> Result<Vec<ChannelMessage>, CommunityError>;

    async fn delete_message(&self, message: MessageId) -> Result<(), CommunityError>;

    /// Send a private message to `member`.
    async fn send_private(&self, member: MemberId, text: &str) -> Result<(), CommunityError>;
}
