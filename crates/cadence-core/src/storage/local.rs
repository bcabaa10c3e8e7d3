//! Local snapshot store
//!
//! Keeps the latest known snapshot per owner on the device. Used as the
//! offline durability layer and as a fallback when the remote store has
//! nothing at load time.
//!
//! Files: `<snapshots_dir>/planner_backup_<owner>.json`

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::error::{StorageError, StorageResult};
use crate::document::{DocumentSnapshot, OwnerId};

/// Key/value store for the latest snapshot of each owner
pub trait SnapshotStore: Send + Sync {
    /// Overwrite the stored snapshot for `owner`
    fn write(&self, owner: &OwnerId, snapshot: &DocumentSnapshot) -> StorageResult<()>;

    /// Read the last written snapshot for `owner`
    fn read(&self, owner: &OwnerId) -> StorageResult<Option<DocumentSnapshot>>;
}

/// Snapshot store backed by one JSON file per owner
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store rooted at `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the snapshot file for an owner
    pub fn path_for(&self, owner: &OwnerId) -> PathBuf {
        self.dir.join(format!("planner_backup_{}.json", owner))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn write(&self, owner: &OwnerId, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path_for(owner);
        atomic_write(&path, &bytes)?;
        debug!("Wrote local snapshot {:?}", path);
        Ok(())
    }

    fn read(&self, owner: &OwnerId) -> StorageResult<Option<DocumentSnapshot>> {
        let path = self.path_for(owner);

        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(|source| StorageError::Read {
            path: path.clone(),
            source,
        })?;

        let snapshot = serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
            path,
            details: e.to_string(),
        })?;

        Ok(Some(snapshot))
    }
}

/// In-memory snapshot store
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<OwnerId, DocumentSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn write(&self, owner: &OwnerId, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(*owner, snapshot.clone());
        Ok(())
    }

    fn read(&self, owner: &OwnerId) -> StorageResult<Option<DocumentSnapshot>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(owner).cloned())
    }
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    fn write(&self, owner: &OwnerId, snapshot: &DocumentSnapshot) -> StorageResult<()> {
        (**self).write(owner, snapshot)
    }

    fn read(&self, owner: &OwnerId) -> StorageResult<Option<DocumentSnapshot>> {
        (**self).read(owner)
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::write(parent, e))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path).map_err(|e| StorageError::write(&temp_path, e))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(|e| StorageError::write(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::write(path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MonthSection, PlanDocument};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn snapshot(owner: OwnerId, title: &str) -> DocumentSnapshot {
        let mut doc = PlanDocument::new();
        doc.add_month(MonthSection::new(title));
        DocumentSnapshot::new(owner, doc)
    }

    #[test]
    fn test_file_store_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path().join("snapshots"));
        let owner = Uuid::new_v4();

        assert!(store.read(&owner).unwrap().is_none());

        let snap = snapshot(owner, "Month A");
        store.write(&owner, &snap).unwrap();

        let loaded = store.read(&owner).unwrap().unwrap();
        assert_eq!(loaded, snap);
        assert!(store.path_for(&owner).exists());
    }

    #[test]
    fn test_file_store_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path());
        let owner = Uuid::new_v4();

        store.write(&owner, &snapshot(owner, "Month A")).unwrap();
        store.write(&owner, &snapshot(owner, "Month B")).unwrap();

        let loaded = store.read(&owner).unwrap().unwrap();
        assert_eq!(loaded.document.months()[0].title, "Month B");
        // No temp file left behind
        assert!(!store.path_for(&owner).with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_keys_by_owner() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.write(&alice, &snapshot(alice, "Alice")).unwrap();

        assert!(store.read(&bob).unwrap().is_none());
        assert_eq!(
            store.read(&alice).unwrap().unwrap().document.months()[0].title,
            "Alice"
        );
        assert_ne!(store.path_for(&alice), store.path_for(&bob));
    }

    #[test]
    fn test_file_store_corrupt_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp_dir.path());
        let owner = Uuid::new_v4();

        fs::write(store.path_for(&owner), b"{ not json").unwrap();

        let err = store.read(&owner).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_unwritable_dir() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("locked");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o500)).unwrap();
        let store = FileSnapshotStore::new(&dir);
        let owner = Uuid::new_v4();

        let result = store.write(&owner, &snapshot(owner, "Month A"));
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)).unwrap();

        // Root ignores directory permissions
        if let Err(err) = result {
            assert!(matches!(err, StorageError::Write { .. }));
            assert!(err.recovery_suggestion().is_some());
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        let owner = Uuid::new_v4();

        assert!(store.read(&owner).unwrap().is_none());
        store.write(&owner, &snapshot(owner, "Month A")).unwrap();
        assert_eq!(
            store.read(&owner).unwrap().unwrap().document.months()[0].title,
            "Month A"
        );
    }
}
