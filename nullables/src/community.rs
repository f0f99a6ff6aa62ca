//! Nullable chat community: roster, verified marker and claim channel.

use async_trait::async_trait;
use rosterlink_community::{ChannelMessage, ClaimChannel, CommunityApi, CommunityError, MessageId};
use rosterlink_types::{MemberId, MembershipSnapshot};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// An in-memory community.
///
/// Granting or revoking the marker updates the roster, so a later
/// [`fetch_roster`](CommunityApi::fetch_roster) sees the change.
pub struct NullCommunity {
    roster: Mutex<BTreeMap<MemberId, bool>>,
    truncated: AtomicBool,
    roster_failing: AtomicBool,
    roster_hanging: AtomicBool,
    roster_delay: Mutex<Option<Duration>>,
    grant_hanging: AtomicBool,
    revoke_hanging: AtomicBool,
    failing_grants: Mutex<HashSet<MemberId>>,
    failing_revokes: Mutex<HashSet<MemberId>>,
    grants: Mutex<Vec<MemberId>>,
    revokes: Mutex<Vec<MemberId>>,
    channel: Mutex<Vec<ChannelMessage>>,
    next_message: AtomicU64,
    deleted: Mutex<Vec<MessageId>>,
    private_messages: Mutex<Vec<(MemberId, String)>>,
    private_failing: AtomicBool,
}

impl NullCommunity {
    pub fn new() -> Self {
        Self {
            roster: Mutex::new(BTreeMap::new()),
            truncated: AtomicBool::new(false),
            roster_failing: AtomicBool::new(false),
            roster_hanging: AtomicBool::new(false),
            roster_delay: Mutex::new(None),
            grant_hanging: AtomicBool::new(false),
            revoke_hanging: AtomicBool::new(false),
            failing_grants: Mutex::new(HashSet::new()),
            failing_revokes: Mutex::new(HashSet::new()),
            grants: Mutex::new(Vec::new()),
            revokes: Mutex::new(Vec::new()),
            channel: Mutex::new(Vec::new()),
            next_message: AtomicU64::new(1000),
            deleted: Mutex::new(Vec::new()),
            private_messages: Mutex::new(Vec::new()),
            private_failing: AtomicBool::new(false),
        }
    }

    /// Build a community from `(member id, holds marker)` pairs.
    pub fn with_members<I>(members: I) -> Self
    where
        I: IntoIterator<Item = (u64, bool)>,
    {
        let community = Self::new();
        for (id, marked) in members {
            community.join(MemberId::new(id), marked);
        }
        community
    }

    pub fn join(&self, member: MemberId, marked: bool) {
        self.roster.lock().unwrap().insert(member, marked);
    }

    pub fn leave(&self, member: MemberId) {
        self.roster.lock().unwrap().remove(&member);
    }

    /// Remove the marker without going through the API (a moderator's manual edit).
    pub fn strip_marker(&self, member: MemberId) {
        if let Some(marked) = self.roster.lock().unwrap().get_mut(&member) {
            *marked = false;
        }
    }

    pub fn has_marker(&self, member: MemberId) -> bool {
        self.roster
            .lock()
            .unwrap()
            .get(&member)
            .copied()
            .unwrap_or(false)
    }

    /// Report future rosters as possibly truncated.
    pub fn set_truncated(&self, truncated: bool) {
        self.truncated.store(truncated, Ordering::SeqCst);
    }

    pub fn set_roster_failing(&self, failing: bool) {
        self.roster_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_roster_hanging(&self, hanging: bool) {
        self.roster_hanging.store(hanging, Ordering::SeqCst);
    }

    /// Read the roster, then wait `delay` before returning it, so the
    /// caller sees a roster that may be stale by the time it arrives.
    pub fn set_roster_delay(&self, delay: Option<Duration>) {
        *self.roster_delay.lock().unwrap() = delay;
    }

    /// Make every marker grant wait forever until reset.
    pub fn set_grant_hanging(&self, hanging: bool) {
        self.grant_hanging.store(hanging, Ordering::SeqCst);
    }

    /// Make every marker revoke wait forever until reset.
    pub fn set_revoke_hanging(&self, hanging: bool) {
        self.revoke_hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn fail_grants_for(&self, member: MemberId) {
        self.failing_grants.lock().unwrap().insert(member);
    }

    pub fn fail_revokes_for(&self, member: MemberId) {
        self.failing_revokes.lock().unwrap().insert(member);
    }

    pub fn set_private_failing(&self, failing: bool) {
        self.private_failing.store(failing, Ordering::SeqCst);
    }

    /// Members a grant was attempted for, in order.
    pub fn grants(&self) -> Vec<MemberId> {
        self.grants.lock().unwrap().clone()
    }

    /// Members a revoke was attempted for, in order.
    pub fn revokes(&self) -> Vec<MemberId> {
        self.revokes.lock().unwrap().clone()
    }

    /// Post a message to the claim channel.
    pub fn post(&self, author: MemberId, content: &str) -> MessageId {
        self.post_as(author, content, false)
    }

    pub fn post_as(&self, author: MemberId, content: &str, is_bot: bool) -> MessageId {
        let id = MessageId(self.next_message.fetch_add(1, Ordering::SeqCst));
        self.channel.lock().unwrap().push(ChannelMessage {
            id,
            author,
            author_name: format!("member-{author}"),
            author_is_bot: is_bot,
            content: content.to_string(),
        });
        id
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn private_messages(&self) -> Vec<(MemberId, String)> {
        self.private_messages.lock().unwrap().clone()
    }
}

impl Default for NullCommunity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommunityApi for NullCommunity {
    async fn fetch_roster(&self) -> Result<MembershipSnapshot, CommunityError> {
        if self.roster_hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.roster_failing.load(Ordering::SeqCst) {
            return Err(CommunityError::Unreachable("null community offline".into()));
        }
        let members: Vec<(MemberId, bool)> = self
            .roster
            .lock()
            .unwrap()
            .iter()
            .map(|(id, marked)| (*id, *marked))
            .collect();
        let snapshot = if self.truncated.load(Ordering::SeqCst) {
            MembershipSnapshot::partial(members)
        } else {
            MembershipSnapshot::complete(members)
        };
        let delay = *self.roster_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn grant_marker(&self, member: MemberId) -> Result<(), CommunityError> {
        self.grants.lock().unwrap().push(member);
        if self.grant_hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing_grants.lock().unwrap().contains(&member) {
            return Err(CommunityError::Status {
                status: 403,
                body: "Missing Permissions".into(),
            });
        }
        let mut roster = self.roster.lock().unwrap();
        match roster.get_mut(&member) {
            Some(marked) => {
                *marked = true;
                Ok(())
            }
            None => Err(CommunityError::Status {
                status: 404,
                body: "Unknown Member".into(),
            }),
        }
    }

    async fn revoke_marker(&self, member: MemberId) -> Result<(), CommunityError> {
        self.revokes.lock().unwrap().push(member);
        if self.revoke_hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing_revokes.lock().unwrap().contains(&member) {
            return Err(CommunityError::Status {
                status: 403,
                body: "Missing Permissions".into(),
            });
        }
        let mut roster = self.roster.lock().unwrap();
        match roster.get_mut(&member) {
            Some(marked) => {
                *marked = false;
                Ok(())
            }
            None => Err(CommunityError::Status {
                status: 404,
                body: "Unknown Member".into(),
            }),
        }
    }
}

#[async_trait]
impl ClaimChannel for NullCommunity {
    async fn poll_messages(
        &self,
        after: Option<MessageId>,
    ) -> Result<Vec<ChannelMessage>, CommunityError> {
        Ok(self
            .channel
            .lock()
            .unwrap()
            .iter()
            .filter(|m| after.map_or(true, |after| m.id > after))
            .cloned()
            .collect())
    }

    async fn delete_message(&self, message: MessageId) -> Result<(), CommunityError> {
        self.channel.lock().unwrap().retain(|m| m.id != message);
        self.deleted.lock().unwrap().push(message);
        Ok(())
    }

    async fn send_private(&self, member: MemberId, text: &str) -> Result<(), CommunityError> {
        if self.private_failing.load(Ordering::SeqCst) {
            return Err(CommunityError::Status {
                status: 403,
                body: "Cannot send messages to this user".into(),
            });
        }
        self.private_messages
            .lock()
            .unwrap()
            .push((member, text.to_string()));
        Ok(())
    }
}
