//! Placeholder resolution during reconciliation.

use std::collections::BTreeMap;

use crate::graph::ResourceGraph;
use crate::placeholder::{AttrRef, PlaceholderError, Resolver};

use super::types::ReconcileResult;

/// Attributes of a node's reconciled ancestors.
///
/// Owns its data so it can move into a spawned task. Only ancestors are
/// visible: a node never observes attributes of resources it is not ordered
/// after.
#[derive(Debug, Clone, Default)]
pub struct AttributeResolver {
  attributes: BTreeMap<String, BTreeMap<String, String>>,
}

impl AttributeResolver {
  pub fn for_node(name: &str, graph: &ResourceGraph, result: &ReconcileResult) -> Self {
    let attributes = graph
      .ancestors(name)
      .into_iter()
      .filter_map(|ancestor| {
        let attrs = result.attributes(&ancestor)?.clone();
        Some((ancestor, attrs))
      })
      .collect();
    Self { attributes }
  }

  pub fn insert(&mut self, resource: impl Into<String>, attributes: BTreeMap<String, String>) {
    self.attributes.insert(resource.into(), attributes);
  }
}

impl Resolver for AttributeResolver {
  fn resolve(&self, reference: &AttrRef) -> Result<&str, PlaceholderError> {
    self
      .attributes
      .get(&reference.resource)
      .and_then(|attrs| attrs.get(&reference.attr))
      .map(String::as_str)
      .ok_or_else(|| PlaceholderError::Unresolved(reference.clone()))
  }
}
