//! Fundamental types for rosterlink.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! the identities of both directories, the verification mapping between them,
//! and the wholesale snapshots each side is fetched as.

pub mod error;
pub mod identity;
pub mod mapping;
pub mod snapshot;

pub use error::{IdentityError, MappingConflict};
pub use identity::{ExternalIdentity, MemberId};
pub use mapping::{MappingSet, VerificationMapping};
pub use snapshot::{DirectorySnapshot, MemberStatus, MembershipSnapshot};
