//! Asset pre-flight.
//!
//! Site content and function code are opaque to reconciliation, but they are
//! checked and content hashed before any provider call so a missing index
//! document or handler fails the run without touching live resources. The
//! hashes let reconciliation skip uploads when nothing changed.

mod function;
mod site;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use function::verify_entry_point;
pub use site::{SiteObject, content_type_for, site_objects};

use crate::manifest::Manifest;
use crate::placeholder;
use crate::resource::{ResourceKind, ResourceSpec};
use crate::util::hash::{ContentHash, ContentHashError, hash_directory, hash_file};

#[derive(Debug, Error)]
pub enum AssetError {
  #[error("asset for '{resource}' not found: {path}")]
  Missing { resource: String, path: PathBuf },

  #[error("asset for '{resource}' is empty: {path}")]
  Empty { resource: String, path: PathBuf },

  #[error("cannot read {path}: {message}")]
  Unreadable { path: PathBuf, message: String },

  #[error("asset path of '{resource}' must not contain references: {path}")]
  Unresolved { resource: String, path: String },

  #[error("content uploaded to bucket '{bucket}' by {resource} has no '{document}', its index document")]
  IndexDocumentMissing {
    resource: String,
    bucket: String,
    document: String,
  },

  #[error("handler '{handler}' of '{resource}' is not of the form <module>.<export>")]
  InvalidHandler { resource: String, handler: String },

  #[error("handler module '{module}' of '{resource}' not found in {dir}")]
  HandlerModuleMissing {
    resource: String,
    module: String,
    dir: PathBuf,
  },

  #[error("'{file}' does not define '{export}' required by '{resource}'")]
  HandlerExportMissing {
    resource: String,
    export: String,
    file: PathBuf,
  },

  #[error("invalid props for '{resource}': {message}")]
  Spec { resource: String, message: String },

  #[error(transparent)]
  Hash(#[from] ContentHashError),
}

/// Content hashes of every asset in a manifest, keyed by resource name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedAssets {
  hashes: BTreeMap<String, ContentHash>,
}

impl PreparedAssets {
  pub fn hash(&self, resource: &str) -> Option<&ContentHash> {
    self.hashes.get(resource)
  }

  pub fn len(&self) -> usize {
    self.hashes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.hashes.is_empty()
  }
}

/// Keys uploaded into one bucket, across every content declaration targeting it.
#[derive(Default)]
struct BucketUploads {
  resources: Vec<String>,
  keys: BTreeSet<String>,
}

/// Check and hash every asset the manifest declares.
pub fn preflight(manifest: &Manifest) -> Result<PreparedAssets, AssetError> {
  let mut hashes = BTreeMap::new();
  let mut uploads: BTreeMap<&str, BucketUploads> = BTreeMap::new();

  for (name, def) in &manifest.resources {
    let spec = match def.kind {
      ResourceKind::SiteContent | ResourceKind::Function => {
        ResourceSpec::from_props(def.kind, &def.props).map_err(|e| AssetError::Spec {
          resource: name.clone(),
          message: e.to_string(),
        })?
      }
      _ => continue,
    };

    let hash = match spec {
      ResourceSpec::SiteContent(content) => {
        ensure_literal(name, &content.source)?;
        let objects = site_objects(name, &content)?;
        if let Some(bucket) = target_bucket(manifest, &content.bucket) {
          let entry = uploads.entry(bucket).or_default();
          entry.resources.push(name.clone());
          entry.keys.extend(objects.into_iter().map(|o| o.key));
        }
        hash_path(Path::new(&content.source))?
      }
      ResourceSpec::Function(function) => {
        ensure_literal(name, &function.code)?;
        let entry = verify_entry_point(name, &function)?;
        debug!(resource = %name, entry = %entry.display(), "verified handler");
        hash_directory(Path::new(&function.code))?
      }
      _ => continue,
    };

    debug!(resource = %name, hash = %hash, "hashed asset");
    hashes.insert(name.clone(), hash);
  }

  for (bucket, uploaded) in &uploads {
    check_index_document(manifest, bucket, uploaded)?;
  }

  Ok(PreparedAssets { hashes })
}

fn ensure_literal(resource: &str, path: &str) -> Result<(), AssetError> {
  if placeholder::has_references(path) {
    return Err(AssetError::Unresolved {
      resource: resource.to_string(),
      path: path.to_string(),
    });
  }
  Ok(())
}

fn hash_path(path: &Path) -> Result<ContentHash, ContentHashError> {
  if path.is_file() { hash_file(path) } else { hash_directory(path) }
}

/// The bucket a content declaration targets, by logical name.
fn target_bucket<'a>(manifest: &'a Manifest, bucket: &str) -> Option<&'a str> {
  let name = placeholder::sole_reference(bucket)
    .map(|r| r.resource)
    .unwrap_or_else(|| bucket.to_string());
  manifest
    .resources
    .get_key_value(&name)
    .filter(|(_, def)| def.kind == ResourceKind::StorageBucket)
    .map(|(k, _)| k.as_str())
}

fn check_index_document(manifest: &Manifest, bucket: &str, uploaded: &BucketUploads) -> Result<(), AssetError> {
  let Some(document) = manifest.resources[bucket]
    .props
    .get("index_document")
    .and_then(|v| v.as_str())
  else {
    return Ok(());
  };

  if uploaded.keys.contains(document) {
    return Ok(());
  }
  Err(AssetError::IndexDocumentMissing {
    resource: uploaded.resources.join(", "),
    bucket: bucket.to_string(),
    document: document.to_string(),
  })
}
