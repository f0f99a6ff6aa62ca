//! Identities on either side of the bridge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::IdentityError;

/// An account name in the media-server directory.
///
/// Compared byte-for-byte; the directory is the authority on spelling.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalIdentity(String);

impl ExternalIdentity {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExternalIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExternalIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A community member id (a 64-bit snowflake on the chat platform).
///
/// Stable for the member's lifetime in the community, independent of any
/// display name. The chat API transports these as decimal strings; the
/// mapping file stores them as JSON numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(u64);

impl MemberId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MemberId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for MemberId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| IdentityError::InvalidMemberId(s.to_string()))
    }
}
