//! REST implementation of [`CommunityApi`] and [`ClaimChannel`].

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use std::future::Future;
use std::time::Duration;

use rosterlink_types::{MemberId, MembershipSnapshot};

use crate::wire::{self, parse_snowflake};
use crate::{ChannelMessage, ClaimChannel, CommunityApi, CommunityError, MessageId};

/// Largest page the members endpoint accepts.
const MAX_PAGE_SIZE: usize = 1000;

/// Messages fetched per claim-channel poll.
const MESSAGE_BATCH: usize = 50;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retries for one roster page answered with HTTP 429.
const RATE_LIMIT_RETRIES: u32 = 3;

/// Longer advertised waits fail the call instead of stalling the cycle.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Connection settings for [`ChatClient::connect`].
#[derive(Clone)]
pub struct ChatSettings {
    /// API base, e.g. `https://discord.com/api/v10`.
    pub api_url: String,
    pub token: String,
    /// Community id. Resolved from the claim channel when `None`.
    pub guild_id: Option<u64>,
    pub verified_role_id: u64,
    pub claim_channel_id: u64,
    pub roster_page_size: usize,
    pub max_roster_size: usize,
    pub timeout: Duration,
}

/// Chat platform REST client bound to one community, one role and one channel.
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    guild_id: u64,
    verified_role_id: u64,
    claim_channel_id: u64,
    page_size: usize,
    max_roster_size: usize,
}

impl ChatClient {
    /// Build the client, looking up the community id from the claim
    /// channel if the settings do not name one.
    pub async fn connect(settings: ChatSettings) -> Result<Self, CommunityError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(settings.timeout))
            .build()
            .map_err(|e| CommunityError::Other(format!("failed to create HTTP client: {e}")))?;

        let mut client = Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.token,
            guild_id: settings.guild_id.unwrap_or_default(),
            verified_role_id: settings.verified_role_id,
            claim_channel_id: settings.claim_channel_id,
            page_size: settings.roster_page_size.clamp(1, MAX_PAGE_SIZE),
            max_roster_size: settings.max_roster_size.max(1),
        };

        if settings.guild_id.is_none() {
            client.guild_id = client.channel_guild(client.claim_channel_id).await?;
            tracing::info!(guild = client.guild_id, "resolved community from claim channel");
        }
        Ok(client)
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header(header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, CommunityError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let limit = response
                .json::<wire::RateLimit>()
                .await
                .map(|r| r.retry_after)
                .unwrap_or(1.0);
            return Err(CommunityError::RateLimited {
                retry_after_secs: limit,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommunityError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn channel_guild(&self, channel_id: u64) -> Result<u64, CommunityError> {
        let channel: wire::Channel = self
            .execute(self.request(Method::GET, &format!("/channels/{channel_id}")))
            .await?
            .json()
            .await?;
        let guild = channel.guild_id.ok_or_else(|| {
            CommunityError::InvalidResponse(format!("channel {channel_id} is not in a community"))
        })?;
        parse_snowflake(&guild)
    }

    async fn member_page(&self, after: u64) -> Result<Vec<wire::GuildMember>, CommunityError> {
        let path = format!("/guilds/{}/members", self.guild_id);
        let request = self
            .request(Method::GET, &path)
            .query(&[("limit", self.page_size as u64), ("after", after)]);
        Ok(self.execute(request).await?.json().await?)
    }

    fn role_path(&self, member: MemberId) -> String {
        format!(
            "/guilds/{}/members/{}/roles/{}",
            self.guild_id, member, self.verified_role_id
        )
    }
}

#[async_trait]
impl CommunityApi for ChatClient {
    async fn fetch_roster(&self) -> Result<MembershipSnapshot, CommunityError> {
        let mut pager = RosterPager::new(self.page_size, self.max_roster_size);
        let mut after = 0;
        loop {
            let page = retry_rate_limited(|| self.member_page(after)).await?;
            let raw_len = page.len();
            let mut entries = Vec::with_capacity(raw_len);
            for member in &page {
                if let Some(entry) = member.entry(self.verified_role_id)? {
                    entries.push(entry);
                }
            }
            match pager.push_page(entries, raw_len) {
                PageStep::Continue(cursor) => after = cursor,
                PageStep::Done => break,
            }
        }
        let roster = pager.finish();
        if !roster.is_complete() {
            tracing::warn!(
                members = roster.len(),
                limit = self.max_roster_size,
                "roster fetch may be truncated"
            );
        }
        Ok(roster)
    }

    async fn grant_marker(&self, member: MemberId) -> Result<(), CommunityError> {
        self.execute(self.request(Method::PUT, &self.role_path(member)))
            .await?;
        Ok(())
    }

    async fn revoke_marker(&self, member: MemberId) -> Result<(), CommunityError> {
        self.execute(self.request(Method::DELETE, &self.role_path(member)))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClaimChannel for ChatClient {
    async fn poll_messages(
        &self,
        after: Option<MessageId>,
    ) -> Result<Vec<ChannelMessage>, CommunityError> {
        let path = format!("/channels/{}/messages", self.claim_channel_id);
        let mut request = self
            .request(Method::GET, &path)
            .query(&[("limit", MESSAGE_BATCH as u64)]);
        if let Some(after) = after {
            request = request.query(&[("after", after.0)]);
        }

        let raw: Vec<wire::Message> = self.execute(request).await?.json().await?;
        let mut messages = raw
            .into_iter()
            .map(ChannelMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn delete_message(&self, message: MessageId) -> Result<(), CommunityError> {
        let path = format!("/channels/{}/messages/{}", self.claim_channel_id, message);
        self.execute(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn send_private(&self, member: MemberId, text: &str) -> Result<(), CommunityError> {
        let dm: wire::DmChannel = self
            .execute(
                self.request(Method::POST, "/users/@me/channels")
                    .json(&wire::CreateDm {
                        recipient_id: member.to_string(),
                    }),
            )
            .await?
            .json()
            .await?;

        let path = format!("/channels/{}/messages", dm.id);
        self.execute(
            self.request(Method::POST, &path)
                .json(&wire::CreateMessage { content: text }),
        )
        .await?;
        Ok(())
    }
}

/// Run `call`, waiting out short rate limits between attempts.
async fn retry_rate_limited<T, F, Fut>(mut call: F) -> Result<T, CommunityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CommunityError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Err(CommunityError::RateLimited { retry_after_secs })
                if attempt < RATE_LIMIT_RETRIES
                    && retry_after_secs <= MAX_RETRY_AFTER.as_secs_f64() =>
            {
                attempt += 1;
                tracing::debug!(retry_after_secs, attempt, "rate limited, retrying");
                tokio::time::sleep(Duration::from_secs_f64(retry_after_secs.max(0.0))).await;
            }
            other => return other,
        }
    }
}

/// Outcome of feeding one page to a [`RosterPager`].
#[derive(Debug, PartialEq, Eq)]
enum PageStep {
    Continue(u64),
    Done,
}

/// Accumulates member pages and decides when the roster is complete.
///
/// A short page ends the roster. Hitting the size cap on a full page means
/// more members may exist, so the result is flagged partial.
struct RosterPager {
    page_size: usize,
    max_members: usize,
    members: Vec<(MemberId, bool)>,
    complete: bool,
}

impl RosterPager {
    fn new(page_size: usize, max_members: usize) -> Self {
        Self {
            page_size,
            max_members,
            members: Vec::new(),
            complete: false,
        }
    }

    fn push_page(&mut self, entries: Vec<(MemberId, bool)>, raw_len: usize) -> PageStep {
        let cursor = entries.iter().map(|(id, _)| id.get()).max();
        self.members.extend(entries);

        if raw_len < self.page_size {
            self.complete = true;
            return PageStep::Done;
        }
        match cursor {
            Some(cursor) if self.members.len() < self.max_members => PageStep::Continue(cursor),
            _ => PageStep::Done,
        }
    }

    fn finish(self) -> MembershipSnapshot {
        if self.complete {
            MembershipSnapshot::complete(self.members)
        } else {
            MembershipSnapshot::partial(self.members)
        }
    }
}
