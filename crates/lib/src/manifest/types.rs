//! Manifest types for sitestack.
//!
//! The manifest captures the complete desired state of one stack. It is
//! produced by evaluating the stack file and is stored verbatim in snapshots,
//! so the next run can tell which resources left the stack.
//!
//! # Example
//!
//! ```json
//! {
//!   "stack": "dev",
//!   "resources": {
//!     "site": { "kind": "storage_bucket", "name": "site", "props": { "public_read": true } }
//!   },
//!   "outputs": {
//!     "websiteEndpoint": "http://$${res:site:website_endpoint}/"
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::ResourceDef;
use crate::util::hash::{Hashable, ObjectHash};

/// The complete desired state of a stack.
///
/// Uses [`BTreeMap`] so serialization order, and therefore the manifest hash,
/// is deterministic.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  pub stack: String,
  /// Declared resources keyed by logical name.
  pub resources: BTreeMap<String, ResourceDef>,
  /// Output templates keyed by output name.
  #[serde(default)]
  pub outputs: BTreeMap<String, String>,
}

impl Manifest {
  pub fn new(stack: impl Into<String>) -> Self {
    Self {
      stack: stack.into(),
      ..Default::default()
    }
  }

  /// Add a resource, keyed by its name.
  pub fn with_resource(mut self, def: ResourceDef) -> Self {
    self.resources.insert(def.name.clone(), def);
    self
  }

  pub fn with_output(mut self, name: &str, template: &str) -> Self {
    self.outputs.insert(name.to_string(), template.to_string());
    self
  }

  /// Content hash of the whole manifest.
  pub fn hash(&self) -> Result<ObjectHash, serde_json::Error> {
    self.compute_hash()
  }
}

impl Hashable for Manifest {}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::ResourceKind;

  #[test]
  fn hash_changes_with_props() {
    let a = Manifest::new("dev").with_resource(ResourceDef::new(ResourceKind::StorageBucket, "site"));
    let b = Manifest::new("dev")
      .with_resource(ResourceDef::new(ResourceKind::StorageBucket, "site").prop("public_read", true));

    assert_eq!(a.hash().unwrap(), a.clone().hash().unwrap());
    assert_ne!(a.hash().unwrap(), b.hash().unwrap());
  }

  #[test]
  fn serde_roundtrip() {
    let manifest = Manifest::new("dev")
      .with_resource(
        ResourceDef::new(ResourceKind::Stage, "stage")
          .prop("api", "$${res:gateway:id}")
          .depends_on("route"),
      )
      .with_output("apiEndpoint", "$${res:stage:invoke_url}");

    let json = serde_json::to_string(&manifest).unwrap();
    let parsed: Manifest = serde_json::from_str(&json).unwrap();
    assert_eq!(manifest, parsed);
  }
}
