//! JSON shapes of the chat REST API. Snowflakes arrive as decimal strings.

use serde::{Deserialize, Serialize};

use rosterlink_types::MemberId;

use crate::{ChannelMessage, CommunityError, MessageId};

#[derive(Debug, Deserialize)]
pub(crate) struct Channel {
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GuildMember {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    pub id: String,
    pub author: User,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateDm {
    pub recipient_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DmChannel {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMessage<'a> {
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateLimit {
    #[serde(default)]
    pub retry_after: f64,
}

pub(crate) fn parse_snowflake(raw: &str) -> Result<u64, CommunityError> {
    raw.parse::<u64>()
        .map_err(|_| CommunityError::InvalidResponse(format!("invalid snowflake {raw:?}")))
}

impl GuildMember {
    /// `(member id, holds role)`; members without a user object are skipped.
    pub fn entry(&self, role_id: u64) -> Result<Option<(MemberId, bool)>, CommunityError> {
        let Some(user) = &self.user else {
            return Ok(None);
        };
        let id = MemberId::new(parse_snowflake(&user.id)?);
        let role = role_id.to_string();
        Ok(Some((id, self.roles.iter().any(|r| *r == role))))
    }
}

impl TryFrom<Message> for ChannelMessage {
    type Error = CommunityError;

    fn try_from(msg: Message) -> Result<Self, Self::Error> {
        Ok(ChannelMessage {
            id: MessageId(parse_snowflake(&msg.id)?),
            author: MemberId::new(parse_snowflake(&msg.author.id)?),
            author_name: msg.author.username,
            author_is_bot: msg.author.bot,
            content: msg.content,
        })
    }
}
