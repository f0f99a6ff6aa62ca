//! JSON file backend.
//!
//! The file holds a single object mapping external identity to member id:
//!
//! ```json
//! {"alice": 175928847299117063, "bob": 80351110224678912}
//! ```
//!
//! Writes go to a sibling temp file which is fsynced and then renamed over
//! the target, so a crash mid-write leaves either the old or the new file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use rosterlink_types::{ExternalIdentity, MappingSet, MemberId};

use crate::{MappingStore, StoreError};

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "mappings.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl MappingStore for JsonFileStore {
    fn load(&self) -> Result<MappingSet, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no mapping file yet, starting empty");
                return Ok(MappingSet::new());
            }
            Err(e) => return Err(e.into()),
        };

        let raw: BTreeMap<String, u64> = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;

        let (set, rejected) = MappingSet::from_entries(
            raw.into_iter()
                .map(|(external, member)| (ExternalIdentity::new(external), MemberId::new(member))),
        );
        for mapping in &rejected {
            tracing::warn!(
                external = %mapping.external,
                member = %mapping.member,
                "dropping duplicate mapping for an already mapped member"
            );
        }

        tracing::debug!(count = set.len(), path = %self.path.display(), "loaded mappings");
        Ok(set)
    }

    fn replace_all(&self, mappings: &MappingSet) -> Result<(), StoreError> {
        let raw: BTreeMap<String, u64> = mappings
            .iter()
            .map(|m| (m.external.as_str().to_string(), m.member.get()))
            .collect();
        let json = serde_json::to_vec(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterlink_types::VerificationMapping;

    fn temp_store() -> (tempfile::TempDir, JsonFileStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::new(dir.path().join("known_users.json"));
        (dir, store)
    }

    fn mapping(external: &str, member: u64) -> VerificationMapping {
        VerificationMapping::new(external, MemberId::new(member))
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, store) = temp_store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn replace_all_then_load_roundtrip() {
        let (_dir, store) = temp_store();
        let set: MappingSet = vec![mapping("alice", 42), mapping("bob", 99)]
            .into_iter()
            .collect();

        store.replace_all(&set).unwrap();
        assert_eq!(store.load().unwrap(), set);
    }

    #[test]
    fn file_format_is_a_flat_object_of_numbers() {
        let (_dir, store) = temp_store();
        let set: MappingSet = vec![mapping("alice", 42)].into_iter().collect();
        store.replace_all(&set).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(text, r#"{"alice":42}"#);
    }

    #[test]
    fn replace_all_overwrites_previous_contents() {
        let (_dir, store) = temp_store();
        let first: MappingSet = vec![mapping("alice", 42), mapping("bob", 99)]
            .into_iter()
            .collect();
        store.replace_all(&first).unwrap();

        let second: MappingSet = vec![mapping("bob", 99)].into_iter().collect();
        store.replace_all(&second).unwrap();

        assert_eq!(store.load().unwrap(), second);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn reads_files_written_by_older_deployments() {
        let (_dir, store) = temp_store();
        fs::write(store.path(), r#"{"alice": 175928847299117063, "bob": 99}"#).unwrap();

        let set = store.load().unwrap();
        assert_eq!(
            set.member_for(&"alice".into()),
            Some(MemberId::new(175_928_847_299_117_063))
        );
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn duplicate_members_are_dropped_on_load() {
        let (_dir, store) = temp_store();
        fs::write(store.path(), r#"{"alice": 7, "bob": 7}"#).unwrap();

        let set = store.load().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.external_for(MemberId::new(7)), Some(&"alice".into()));
    }

    #[test]
    fn non_object_file_is_corrupt() {
        let (_dir, store) = temp_store();
        fs::write(store.path(), "[1, 2, 3]").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/state/known_users.json"));
        store.replace_all(&MappingSet::new()).unwrap();
        assert!(store.path().exists());
    }
}
