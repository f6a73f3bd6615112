use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::manifest::Manifest;
use crate::resource::ResourceDef;

/// Version of the on-disk index format.
pub const SNAPSHOT_INDEX_VERSION: u32 = 1;

/// The state a run left behind: what was declared, and the outputs that were
/// ready when it finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub id: String,
  pub created_at: u64,
  pub config_path: Option<PathBuf>,
  pub manifest: Manifest,
  /// Only outputs whose every dependency reconciled.
  #[serde(default)]
  pub outputs: BTreeMap<String, String>,
  /// Resources that left the stack but could not be deleted yet.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub pending_deletion: BTreeMap<String, ResourceDef>,
}

impl Snapshot {
  pub fn new(id: String, config_path: Option<PathBuf>, manifest: Manifest) -> Self {
    Self {
      id,
      created_at: unix_now(),
      config_path,
      manifest,
      outputs: BTreeMap::new(),
      pending_deletion: BTreeMap::new(),
    }
  }

  pub fn with_outputs(mut self, outputs: BTreeMap<String, String>) -> Self {
    self.outputs = outputs;
    self
  }

  pub fn with_pending_deletion(mut self, pending: BTreeMap<String, ResourceDef>) -> Self {
    self.pending_deletion = pending;
    self
  }

  /// Everything this snapshot still manages: the declared manifest plus
  /// resources awaiting deletion.
  pub fn managed_manifest(&self) -> Manifest {
    let mut manifest = self.manifest.clone();
    for (name, def) in &self.pending_deletion {
      manifest.resources.entry(name.clone()).or_insert_with(|| def.clone());
    }
    manifest
  }

  pub fn to_metadata(&self) -> SnapshotMetadata {
    SnapshotMetadata {
      id: self.id.clone(),
      created_at: self.created_at,
      config_path: self.config_path.clone(),
      resource_count: self.manifest.resources.len(),
      output_count: self.outputs.len(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
  pub id: String,
  pub created_at: u64,
  pub config_path: Option<PathBuf>,
  pub resource_count: usize,
  pub output_count: usize,
}

/// Every snapshot of a stack, oldest first, plus the current pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotIndex {
  pub version: u32,
  pub current: Option<String>,
  pub snapshots: Vec<SnapshotMetadata>,
}

impl Default for SnapshotIndex {
  fn default() -> Self {
    Self::new()
  }
}

impl SnapshotIndex {
  pub fn new() -> Self {
    Self {
      version: SNAPSHOT_INDEX_VERSION,
      current: None,
      snapshots: Vec::new(),
    }
  }

  /// Add or replace a snapshot's metadata.
  pub fn add(&mut self, metadata: SnapshotMetadata) {
    self.remove(&metadata.id);
    self.snapshots.push(metadata);
  }

  /// Remove a snapshot; clears the current pointer if it pointed there.
  pub fn remove(&mut self, id: &str) {
    self.snapshots.retain(|s| s.id != id);
    if self.current.as_deref() == Some(id) {
      self.current = None;
    }
  }

  pub fn get(&self, id: &str) -> Option<&SnapshotMetadata> {
    self.snapshots.iter().find(|s| s.id == id)
  }

  pub fn set_current(&mut self, id: &str) -> Result<(), SnapshotError> {
    if self.get(id).is_none() {
      return Err(SnapshotError::NotFound(id.to_string()));
    }
    self.current = Some(id.to_string());
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.snapshots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.snapshots.is_empty()
  }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("failed to create snapshot directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read snapshot: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write snapshot: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse snapshot: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize snapshot: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("snapshot not found: {0}")]
  NotFound(String),

  #[error("unsupported snapshot index version {0}")]
  UnsupportedVersion(u32),
}

fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

/// Time-ordered id, unique within a process.
pub fn generate_snapshot_id() -> String {
  static COUNTER: AtomicU32 = AtomicU32::new(0);
  let millis = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis();
  let seq = COUNTER.fetch_add(1, Ordering::Relaxed) % 0x10000;
  format!("{:012x}{:04x}", millis, seq)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn metadata(id: &str) -> SnapshotMetadata {
    Snapshot::new(id.to_string(), None, Manifest::new("dev")).to_metadata()
  }

  #[test]
  fn managed_manifest_includes_pending_deletions() {
    use crate::resource::ResourceKind;

    let pending = BTreeMap::from([(
      "old".to_string(),
      ResourceDef::new(ResourceKind::Api, "old"),
    )]);
    let snapshot = Snapshot::new("s".into(), None, Manifest::new("dev")).with_pending_deletion(pending);
    assert!(snapshot.manifest.resources.is_empty());
    assert!(snapshot.managed_manifest().resources.contains_key("old"));
  }

  #[test]
  fn index_add_replaces_existing() {
    let mut index = SnapshotIndex::new();
    index.add(metadata("a"));
    index.add(metadata("b"));
    index.add(metadata("a"));
    let ids: Vec<&str> = index.snapshots.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
  }

  #[test]
  fn removing_current_clears_pointer() {
    let mut index = SnapshotIndex::new();
    index.add(metadata("a"));
    index.set_current("a").unwrap();
    index.remove("a");
    assert!(index.current.is_none());
    assert!(index.is_empty());
  }

  #[test]
  fn set_current_requires_known_id() {
    let mut index = SnapshotIndex::new();
    assert!(matches!(index.set_current("nope"), Err(SnapshotError::NotFound(_))));
  }

  #[test]
  fn ids_are_unique_and_ordered() {
    let a = generate_snapshot_id();
    let b = generate_snapshot_id();
    assert_ne!(a, b);
    assert_eq!(a.len(), 16);
    assert!(a < b || a[..12] != b[..12]);
  }
}
