//! Error types for identity parsing and mapping invariants.

use thiserror::Error;

use crate::{ExternalIdentity, MemberId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid member id: {0:?}")]
    InvalidMemberId(String),
}

/// Raised when an insert would break the one-to-one mapping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingConflict {
    #[error("external identity {external} is already mapped to member {member}")]
    ExternalTaken {
        external: ExternalIdentity,
        member: MemberId,
    },

    #[error("member {member} is already mapped to external identity {external}")]
    MemberTaken {
        member: MemberId,
        external: ExternalIdentity,
    },
}
