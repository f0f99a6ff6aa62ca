//! The verification mapping: a bijection between verified externals and members.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ExternalIdentity, MappingConflict, MemberId};

/// One verified pairing. Never edited in place: replace, don't mutate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationMapping {
    pub external: ExternalIdentity,
    pub member: MemberId,
}

impl VerificationMapping {
    pub fn new(external: impl Into<ExternalIdentity>, member: MemberId) -> Self {
        Self {
            external: external.into(),
            member,
        }
    }
}

/// The full set of verification mappings.
///
/// Both directions are indexed so that every insert can enforce the
/// invariant: at most one mapping per external and at most one per member.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingSet {
    by_external: BTreeMap<ExternalIdentity, MemberId>,
    by_member: BTreeMap<MemberId, ExternalIdentity>,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from raw entries, keeping the first entry for each
    /// member in iteration order.
    ///
    /// Returns the set plus every entry that was dropped because its
    /// member was already taken.
    pub fn from_entries<I>(entries: I) -> (Self, Vec<VerificationMapping>)
    where
        I: IntoIterator<Item = (ExternalIdentity, MemberId)>,
    {
        let mut set = Self::new();
        let mut rejected = Vec::new();
        for (external, member) in entries {
            let mapping = VerificationMapping { external, member };
            if set.insert(mapping.clone()).is_err() {
                rejected.push(mapping);
            }
        }
        (set, rejected)
    }

    pub fn len(&self) -> usize {
        self.by_external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_external.is_empty()
    }

    pub fn member_for(&self, external: &ExternalIdentity) -> Option<MemberId> {
        self.by_external.get(external).copied()
    }

    pub fn external_for(&self, member: MemberId) -> Option<&ExternalIdentity> {
        self.by_member.get(&member)
    }

    pub fn contains(&self, mapping: &VerificationMapping) -> bool {
        self.member_for(&mapping.external) == Some(mapping.member)
    }

    /// Add a mapping, refusing anything that would break the bijection.
    pub fn insert(&mut self, mapping: VerificationMapping) -> Result<(), MappingConflict> {
        if let Some(member) = self.member_for(&mapping.external) {
            return Err(MappingConflict::ExternalTaken {
                external: mapping.external,
                member,
            });
        }
        if let Some(external) = self.external_for(mapping.member) {
            return Err(MappingConflict::MemberTaken {
                member: mapping.member,
                external: external.clone(),
            });
        }
        self.by_member.insert(mapping.member, mapping.external.clone());
        self.by_external.insert(mapping.external, mapping.member);
        Ok(())
    }

    /// Remove the mapping for `external`, if any.
    pub fn remove(&mut self, external: &ExternalIdentity) -> Option<VerificationMapping> {
        let member = self.by_external.remove(external)?;
        self.by_member.remove(&member);
        Some(VerificationMapping {
            external: external.clone(),
            member,
        })
    }

    /// Iterate mappings ordered by external identity.
    pub fn iter(&self) -> impl Iterator<Item = VerificationMapping> + '_ {
        self.by_external
            .iter()
            .map(|(external, member)| VerificationMapping {
                external: external.clone(),
                member: *member,
            })
    }

    /// Check that both indexes describe the same bijection.
    pub fn is_consistent(&self) -> bool {
        self.by_external.len() == self.by_member.len()
            && self
                .by_external
                .iter()
                .all(|(external, member)| self.by_member.get(member) == Some(external))
    }
}

impl FromIterator<VerificationMapping> for MappingSet {
    /// Collects mappings, silently skipping any that conflict with an
    /// earlier one. Use [`MappingSet::from_entries`] to see what was dropped.
    fn from_iter<T: IntoIterator<Item = VerificationMapping>>(iter: T) -> Self {
        Self::from_entries(iter.into_iter().map(|m| (m.external, m.member))).0
    }
}
