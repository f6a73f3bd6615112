//! The provider seam.
//!
//! A [`Provider`] is the only way reconciliation touches live resources. Two
//! implementations ship with the crate:
//!
//! - [`LocalProvider`]: an emulated cloud persisted under a directory, used by
//!   the CLI.
//! - [`MemoryProvider`]: an in-memory cloud with mutation counting and failure
//!   injection, used by tests.
//!
//! Both derive identifiers and attributes the same way (see [`attributes`]),
//! so a stack behaves identically against either.

mod attributes;
mod local;
mod memory;
mod routing;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use attributes::{SUPPORTED_RUNTIMES, attributes, physical_id, validate_bucket_name, validate_desired};
pub use local::{LocalProvider, ServedObject};
pub use memory::MemoryProvider;
pub use routing::{RouteMatch, route_matches};

use crate::consts::{DEFAULT_ACCOUNT_ID, DEFAULT_REGION};
use crate::platform::paths::cloud_dir;
use crate::resource::{ResourceKind, ResourceSpec};
use crate::util::hash::ContentHash;

#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("unsupported runtime '{runtime}' for function '{function}'")]
  UnsupportedRuntime { function: String, runtime: String },

  #[error("invalid {kind} name '{name}': {reason}")]
  InvalidName {
    kind: ResourceKind,
    name: String,
    reason: String,
  },

  #[error("{kind} '{name}' does not exist")]
  NotFound { kind: ResourceKind, name: String },

  #[error("'{resource}' refers to '{reference}', which does not exist")]
  DanglingReference { resource: String, reference: String },

  #[error("bucket '{bucket}' still holds {objects} objects and does not auto-delete them")]
  BucketNotEmpty { bucket: String, objects: usize },

  #[error("{kind} '{name}' cannot be changed in place: {reason}")]
  Rejected {
    kind: ResourceKind,
    name: String,
    reason: String,
  },

  #[error("access denied: {0}")]
  AccessDenied(String),

  #[error("injected failure for '{0}'")]
  Injected(String),

  #[error("I/O error at {path}: {message}")]
  Io { path: PathBuf, message: String },

  #[error("corrupt record {path}: {message}")]
  Corrupt { path: PathBuf, message: String },

  #[error("provider task failed: {0}")]
  Task(String),
}

/// A fully resolved resource, as reconciliation wants it to be.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResource {
  pub name: String,
  pub spec: ResourceSpec,
  /// Content hash of the resource's asset, for site content and functions.
  pub asset_hash: Option<ContentHash>,
}

impl DesiredResource {
  pub fn new(name: impl Into<String>, spec: ResourceSpec) -> Self {
    Self {
      name: name.into(),
      spec,
      asset_hash: None,
    }
  }

  pub fn with_asset_hash(mut self, hash: Option<ContentHash>) -> Self {
    self.asset_hash = hash;
    self
  }

  pub fn kind(&self) -> ResourceKind {
    self.spec.kind()
  }
}

/// A resource as it currently exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveResource {
  pub kind: ResourceKind,
  pub name: String,
  /// Spec the resource was last created or updated with.
  pub spec: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub asset_hash: Option<ContentHash>,
  pub attributes: BTreeMap<String, String>,
}

impl LiveResource {
  /// Top-level spec fields that differ from `desired`, plus `asset` when the
  /// asset content changed. Empty when the resource is up to date.
  pub fn changed_fields(&self, desired: &DesiredResource) -> Vec<String> {
    let want = desired.spec.to_json();
    let empty = serde_json::Map::new();
    let have_fields = self.spec.as_object().unwrap_or(&empty);
    let want_fields = want.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = have_fields.keys().chain(want_fields.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut changed: Vec<String> = keys
      .into_iter()
      .filter(|k| have_fields.get(*k) != want_fields.get(*k))
      .cloned()
      .collect();

    if self.asset_hash != desired.asset_hash {
      changed.push("asset".to_string());
    }
    changed
  }

  pub fn attribute(&self, name: &str) -> Option<&str> {
    self.attributes.get(name).map(String::as_str)
  }
}

/// Where a provider lives and which identifiers it hands out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
  /// Root directory of the local cloud.
  pub root: PathBuf,
  pub region: String,
  pub account_id: String,
}

impl Default for ProviderConfig {
  fn default() -> Self {
    Self {
      root: cloud_dir(),
      region: DEFAULT_REGION.to_string(),
      account_id: DEFAULT_ACCOUNT_ID.to_string(),
    }
  }
}

impl ProviderConfig {
  pub fn with_region(mut self, region: impl Into<String>) -> Self {
    self.region = region.into();
    self
  }

  pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
    self.root = root.into();
    self
  }
}

/// Live resource operations.
///
/// Every method is keyed by resource kind and logical name; the physical
/// identifiers a provider assigns come back as attributes.
pub trait Provider: Send + Sync + 'static {
  /// Current state of a resource, or `None` if it does not exist.
  fn read(&self, kind: ResourceKind, name: &str)
  -> impl Future<Output = Result<Option<LiveResource>, ProviderError>> + Send;

  fn create(&self, desired: &DesiredResource) -> impl Future<Output = Result<LiveResource, ProviderError>> + Send;

  fn update(
    &self,
    desired: &DesiredResource,
    current: &LiveResource,
  ) -> impl Future<Output = Result<LiveResource, ProviderError>> + Send;

  fn delete(&self, current: &LiveResource) -> impl Future<Output = Result<(), ProviderError>> + Send;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::{ApiProtocol, ApiSpec};

  fn api_resource() -> DesiredResource {
    DesiredResource::new(
      "gateway",
      ResourceSpec::Api(ApiSpec {
        protocol: ApiProtocol::Http,
        description: None,
      }),
    )
  }

  #[test]
  fn unchanged_resource_has_no_changed_fields() {
    let desired = api_resource();
    let live = LiveResource {
      kind: ResourceKind::Api,
      name: "gateway".to_string(),
      spec: desired.spec.to_json(),
      asset_hash: None,
      attributes: BTreeMap::new(),
    };
    assert!(live.changed_fields(&desired).is_empty());
  }

  #[test]
  fn changed_fields_and_asset_are_reported() {
    let desired = api_resource();
    let mut live = LiveResource {
      kind: ResourceKind::Api,
      name: "gateway".to_string(),
      spec: serde_json::json!({ "protocol": "HTTP", "description": "old" }),
      asset_hash: Some(ContentHash("abc".to_string())),
      attributes: BTreeMap::new(),
    };
    assert_eq!(live.changed_fields(&desired), vec!["description", "asset"]);

    live.asset_hash = None;
    live.spec = desired.spec.to_json();
    assert!(live.changed_fields(&desired.clone().with_asset_hash(None)).is_empty());
  }
}
