//! Snapshot storage.
//!
//! # Storage Layout
//!
//! ```text
//! {data_dir}/stacks/<stack>/snapshots/
//! ├── index.json          # SnapshotIndex: list + current pointer
//! └── <id>.json           # Individual Snapshot files
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::platform::paths::stack_dir;

use super::types::{SNAPSHOT_INDEX_VERSION, Snapshot, SnapshotError, SnapshotIndex, SnapshotMetadata};

const SNAPSHOTS_DIR: &str = "snapshots";

const INDEX_FILENAME: &str = "index.json";

/// Reads and writes the snapshots of one stack.
///
/// Every write goes to a temporary file first and is renamed into place.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
  base_path: PathBuf,
}

impl SnapshotStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  /// Store under the default state directory of `stack`.
  pub fn for_stack(stack: &str) -> Self {
    Self::new(stack_dir(stack).join(SNAPSHOTS_DIR))
  }

  /// Store under an explicit state directory.
  pub fn in_state_dir(state_dir: &Path) -> Self {
    Self::new(state_dir.join(SNAPSHOTS_DIR))
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn index_path(&self) -> PathBuf {
    self.base_path.join(INDEX_FILENAME)
  }

  fn snapshot_path(&self, id: &str) -> PathBuf {
    self.base_path.join(format!("{}.json", id))
  }

  fn write_atomic(&self, path: &Path, value: &impl Serialize) -> Result<(), SnapshotError> {
    fs::create_dir_all(&self.base_path).map_err(SnapshotError::CreateDir)?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let content = serde_json::to_string_pretty(value).map_err(SnapshotError::Serialize)?;
    fs::write(&temp_path, &content).map_err(SnapshotError::Write)?;
    fs::rename(&temp_path, path).map_err(SnapshotError::Write)
  }

  /// Returns an empty index if none was written yet.
  pub fn load_index(&self) -> Result<SnapshotIndex, SnapshotError> {
    let content = match fs::read_to_string(self.index_path()) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SnapshotIndex::new()),
      Err(e) => return Err(SnapshotError::Read(e)),
    };

    let index: SnapshotIndex = serde_json::from_str(&content).map_err(SnapshotError::Parse)?;
    if index.version != SNAPSHOT_INDEX_VERSION {
      return Err(SnapshotError::UnsupportedVersion(index.version));
    }
    Ok(index)
  }

  fn save_index(&self, index: &SnapshotIndex) -> Result<(), SnapshotError> {
    self.write_atomic(&self.index_path(), index)
  }

  pub fn current_id(&self) -> Result<Option<String>, SnapshotError> {
    Ok(self.load_index()?.current)
  }

  /// `Ok(None)` before the first successful save.
  pub fn load_current(&self) -> Result<Option<Snapshot>, SnapshotError> {
    match self.load_index()?.current {
      Some(id) => Ok(Some(self.load_snapshot(&id)?)),
      None => Ok(None),
    }
  }

  pub fn load_snapshot(&self, id: &str) -> Result<Snapshot, SnapshotError> {
    let content = fs::read_to_string(self.snapshot_path(id)).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        SnapshotError::NotFound(id.to_string())
      } else {
        SnapshotError::Read(e)
      }
    })?;
    serde_json::from_str(&content).map_err(SnapshotError::Parse)
  }

  /// Write a snapshot and make it current.
  pub fn save_and_set_current(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    self.write_atomic(&self.snapshot_path(&snapshot.id), snapshot)?;

    let mut index = self.load_index()?;
    index.add(snapshot.to_metadata());
    index.current = Some(snapshot.id.clone());
    self.save_index(&index)?;

    debug!(id = %snapshot.id, path = %self.base_path.display(), "saved snapshot");
    Ok(())
  }

  pub fn set_current(&self, id: &str) -> Result<(), SnapshotError> {
    if !self.snapshot_path(id).exists() {
      return Err(SnapshotError::NotFound(id.to_string()));
    }
    let mut index = self.load_index()?;
    index.set_current(id)?;
    self.save_index(&index)
  }

  /// Forget the current state without deleting history.
  pub fn clear_current(&self) -> Result<(), SnapshotError> {
    let mut index = self.load_index()?;
    index.current = None;
    self.save_index(&index)
  }

  /// Oldest first.
  pub fn list(&self) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
    Ok(self.load_index()?.snapshots)
  }

  pub fn delete_snapshot(&self, id: &str) -> Result<(), SnapshotError> {
    match fs::remove_file(self.snapshot_path(id)) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(SnapshotError::Write(e)),
    }

    let mut index = self.load_index()?;
    index.remove(id);
    self.save_index(&index)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::Manifest;
  use crate::util::testutil::sample_stack;
  use std::collections::BTreeMap;
  use tempfile::TempDir;

  fn temp_store() -> (TempDir, SnapshotStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = SnapshotStore::in_state_dir(temp_dir.path());
    (temp_dir, store)
  }

  #[test]
  fn empty_store_has_no_current() {
    let (_temp, store) = temp_store();
    assert!(store.load_index().unwrap().is_empty());
    assert!(store.load_current().unwrap().is_none());
  }

  #[test]
  fn save_and_load_current() {
    let (_temp, store) = temp_store();
    let outputs = BTreeMap::from([("apiEndpoint".to_string(), "https://x/dev".to_string())]);
    let snapshot = Snapshot::new("s1".to_string(), None, sample_stack()).with_outputs(outputs);

    store.save_and_set_current(&snapshot).unwrap();
    let loaded = store.load_current().unwrap().unwrap();
    assert_eq!(loaded, snapshot);
    assert_eq!(store.list().unwrap()[0].resource_count, 9);
    assert!(!store.base_path().join("s1.json.tmp").exists());
  }

  #[test]
  fn clear_current_keeps_history() {
    let (_temp, store) = temp_store();
    store
      .save_and_set_current(&Snapshot::new("s1".to_string(), None, Manifest::new("dev")))
      .unwrap();
    store.clear_current().unwrap();

    assert!(store.current_id().unwrap().is_none());
    assert!(store.load_snapshot("s1").is_ok());
    store.set_current("s1").unwrap();
    assert_eq!(store.current_id().unwrap().as_deref(), Some("s1"));
  }

  #[test]
  fn delete_snapshot_updates_index() {
    let (_temp, store) = temp_store();
    store
      .save_and_set_current(&Snapshot::new("s1".to_string(), None, Manifest::new("dev")))
      .unwrap();
    store.delete_snapshot("s1").unwrap();
    assert!(matches!(store.load_snapshot("s1"), Err(SnapshotError::NotFound(_))));
    assert!(store.current_id().unwrap().is_none());
  }

  #[test]
  fn rejects_unknown_index_version() {
    let (temp, store) = temp_store();
    fs::create_dir_all(temp.path().join("snapshots")).unwrap();
    fs::write(
      temp.path().join("snapshots/index.json"),
      r#"{"version": 99, "current": null, "snapshots": []}"#,
    )
    .unwrap();
    assert!(matches!(store.load_index(), Err(SnapshotError::UnsupportedVersion(99))));
  }
}
