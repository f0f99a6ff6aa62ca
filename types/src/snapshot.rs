//! Wholesale snapshots of both directories.
//!
//! Neither side offers an incremental feed, so each fetch replaces the
//! previous snapshot entirely and the engine computes its own diff.

use std::collections::{HashMap, HashSet};

use crate::{ExternalIdentity, MemberId};

/// Every account name currently known to the media server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    identities: HashSet<ExternalIdentity>,
}

impl DirectorySnapshot {
    pub fn new<I, T>(identities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ExternalIdentity>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, identity: &ExternalIdentity) -> bool {
        self.identities.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Where a member stands in a [`MembershipSnapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    /// Not in the roster.
    Absent,
    /// In the roster without the verified marker.
    Unmarked,
    /// In the roster and holding the verified marker.
    Marked,
}

/// The community roster: member id to "holds the verified marker".
///
/// A roster fetch is bounded in size. When the bound may have cut the
/// roster short the snapshot is flagged incomplete, and absence from it
/// must not be read as "left the community".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipSnapshot {
    members: HashMap<MemberId, bool>,
    complete: bool,
}

impl MembershipSnapshot {
    /// A roster known to contain every member.
    pub fn complete<I>(members: I) -> Self
    where
        I: IntoIterator<Item = (MemberId, bool)>,
    {
        Self {
            members: members.into_iter().collect(),
            complete: true,
        }
    }

    /// A roster that may be missing members.
    pub fn partial<I>(members: I) -> Self
    where
        I: IntoIterator<Item = (MemberId, bool)>,
    {
        Self {
            members: members.into_iter().collect(),
            complete: false,
        }
    }

    pub fn status(&self, member: MemberId) -> MemberStatus {
        match self.members.get(&member) {
            None => MemberStatus::Absent,
            Some(false) => MemberStatus::Unmarked,
            Some(true) => MemberStatus::Marked,
        }
    }

    /// Whether absence from this roster proves a member has left.
    ///
    /// An empty roster never counts: the caller's own account is always a member.
    pub fn is_complete(&self) -> bool {
        self.complete && !self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn marked_count(&self) -> usize {
        self.members.values().filter(|marked| **marked).count()
    }
}
