//! Hashing for manifests, snapshots and asset content.
//!
//! - [`ObjectHash`]: truncated SHA-256 of a serialized value, used to identify
//!   manifests and snapshots.
//! - [`ContentHash`]: full SHA-256 of asset bytes, used to detect code and
//!   site changes without comparing files.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

/// A truncated hash identifying a serialized object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Types whose JSON form identifies them.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, serde_json::Error> {
    let serialized = serde_json::to_string(self)?;
    let full = hex::encode(Sha256::digest(serialized.as_bytes()));
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// A full 64-character SHA-256 digest of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error while hashing files on disk.
#[derive(Debug, thiserror::Error)]
pub enum ContentHashError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to read {path}: {message}")]
  Read { path: String, message: String },
}

/// Hash the contents of a directory tree.
///
/// Only regular files and directory structure contribute; timestamps and
/// permissions do not. Entries are visited in file-name order so the digest
/// is stable across platforms.
pub fn hash_directory(path: &Path) -> Result<ContentHash, ContentHashError> {
  let mut hasher = Sha256::new();

  for entry in WalkDir::new(path).sort_by_file_name().follow_links(true) {
    let entry = entry.map_err(|e| ContentHashError::Walk {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;

    let rel = entry
      .path()
      .strip_prefix(path)
      .unwrap_or(entry.path())
      .to_string_lossy()
      .replace('\\', "/");
    if rel.is_empty() {
      continue;
    }

    if entry.file_type().is_dir() {
      hasher.update(format!("D:{}\n", rel).as_bytes());
    } else if entry.file_type().is_file() {
      let digest = hash_file(entry.path())?;
      hasher.update(format!("F:{}:{}\n", rel, digest.0).as_bytes());
    }
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a single file.
pub fn hash_file(path: &Path) -> Result<ContentHash, ContentHashError> {
  let read_err = |e: std::io::Error| ContentHashError::Read {
    path: path.display().to_string(),
    message: e.to_string(),
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer).map_err(read_err)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}
