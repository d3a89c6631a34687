//! Filesystem artifact store
//!
//! Layout:
//!
//! ```text
//! <root>/semesters/{categoryId}.html
//! <root>/courses/{courseId}.html
//! <root>/users/{userId}.html
//! ```
//!
//! Files hold the exact bytes fetched. Writes go to a temporary file in the
//! target directory and are linked into place only if the name is still free.

use crate::state::EntityKind;
use crate::storage::traits::{
    ArtifactStore, KnownArtifacts, SaveOutcome, StoreError, StoreResult,
};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const ARTIFACT_EXTENSION: &str = "html";

/// Artifact store rooted at an output directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Opens the store, creating the namespace directories if needed
    ///
    /// # Arguments
    ///
    /// * `root` - The output directory
    ///
    /// # Returns
    ///
    /// * `Ok(FsArtifactStore)` - Directories exist and are usable
    /// * `Err(StoreError)` - A directory could not be created
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for kind in EntityKind::all() {
            std::fs::create_dir_all(root.join(kind.namespace()))?;
        }
        Ok(Self { root })
    }

    /// Returns the output directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path an artifact is stored at
    pub fn artifact_path(&self, kind: EntityKind, id: &str) -> StoreResult<PathBuf> {
        validate_id(id)?;
        Ok(self
            .root
            .join(kind.namespace())
            .join(format!("{}.{}", id, ARTIFACT_EXTENSION)))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, kind: EntityKind, id: &str) -> bool {
        self.artifact_path(kind, id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn save(&self, kind: EntityKind, id: &str, bytes: &[u8]) -> StoreResult<SaveOutcome> {
        let path = self.artifact_path(kind, id)?;
        if path.exists() {
            return Ok(SaveOutcome::AlreadyExists);
        }

        let dir = self.root.join(kind.namespace());
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        // persist_noclobber refuses to replace an existing file, so two workers
        // racing on the same key cannot both win
        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(SaveOutcome::Written),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(SaveOutcome::AlreadyExists),
            Err(e) => Err(StoreError::Io(e.error)),
        }
    }

    fn load(&self, kind: EntityKind, id: &str) -> StoreResult<Vec<u8>> {
        let path = self.artifact_path(kind, id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                kind,
                id: id.to_string(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn list(&self, kind: EntityKind) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(self.root.join(kind.namespace()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl KnownArtifacts for FsArtifactStore {
    fn is_archived(&self, kind: EntityKind, id: &str) -> bool {
        self.exists(kind, id)
    }
}

/// Rejects ids that could escape the namespace directory
fn validate_id(id: &str) -> StoreResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, FsArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_namespaces() {
        let (dir, _store) = open_store();
        assert!(dir.path().join("semesters").is_dir());
        assert!(dir.path().join("courses").is_dir());
        assert!(dir.path().join("users").is_dir());
    }

    #[test]
    fn test_save_then_exists_and_load() {
        let (dir, store) = open_store();
        assert!(!store.exists(EntityKind::Course, "42"));

        let outcome = store.save(EntityKind::Course, "42", b"<html>c</html>").unwrap();
        assert_eq!(outcome, SaveOutcome::Written);
        assert!(store.exists(EntityKind::Course, "42"));
        assert!(dir.path().join("courses/42.html").is_file());
        assert_eq!(store.load(EntityKind::Course, "42").unwrap(), b"<html>c</html>");
    }

    #[test]
    fn test_save_is_write_once() {
        let (_dir, store) = open_store();
        store.save(EntityKind::User, "7", b"first").unwrap();

        let outcome = store.save(EntityKind::User, "7", b"second").unwrap();
        assert_eq!(outcome, SaveOutcome::AlreadyExists);
        assert_eq!(store.load(EntityKind::User, "7").unwrap(), b"first");
    }

    #[test]
    fn test_namespaces_are_separate() {
        let (_dir, store) = open_store();
        store.save(EntityKind::Course, "1", b"course").unwrap();
        assert!(!store.exists(EntityKind::User, "1"));
        assert!(!store.exists(EntityKind::Semester, "1"));
    }

    #[test]
    fn test_load_missing() {
        let (_dir, store) = open_store();
        let result = store.load(EntityKind::Semester, "99");
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.save(EntityKind::User, "../escape", b"x"),
            Err(StoreError::InvalidId(_))
        ));
        assert!(!store.exists(EntityKind::User, "a/b"));
        assert!(store.artifact_path(EntityKind::User, "").is_err());
    }

    #[test]
    fn test_list_ignores_temp_files() {
        let (dir, store) = open_store();
        store.save(EntityKind::Course, "2", b"b").unwrap();
        store.save(EntityKind::Course, "1", b"a").unwrap();
        std::fs::write(dir.path().join("courses/.tmpXYZ"), b"partial").unwrap();

        assert_eq!(store.list(EntityKind::Course).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_concurrent_saves_same_key_write_once() {
        let (_dir, store) = open_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .save(EntityKind::Course, "shared", format!("body {}", i).as_bytes())
                        .unwrap()
                })
            })
            .collect();

        let written = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == SaveOutcome::Written)
            .count();
        assert_eq!(written, 1);
    }
}
