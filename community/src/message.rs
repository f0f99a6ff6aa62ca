//! Messages read from the claim channel.

use std::fmt;

use rosterlink_types::MemberId;

/// A chat message id (snowflake). Ids grow with posting time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub author: MemberId,
    /// Display name of the author, for logs only.
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
}
