//! Output publishing.
//!
//! An output is ready only when every resource it reads from, and every
//! transitive dependency of those, reconciled in this run. Anything else is
//! reported as blocked and never handed out as a usable value.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::execute::{AttributeResolver, ReconcileResult};
use crate::graph::ResourceGraph;
use crate::manifest::Manifest;
use crate::placeholder;

/// The state of one named output after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutputValue {
  Ready { value: String },
  /// Resources that did not reconcile.
  Blocked { missing: Vec<String> },
  /// Every dependency reconciled, but the value is unusable.
  Invalid { reason: String },
}

impl OutputValue {
  pub fn ready_value(&self) -> Option<&str> {
    match self {
      OutputValue::Ready { value } => Some(value),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PublishedOutputs {
  pub outputs: BTreeMap<String, OutputValue>,
}

impl PublishedOutputs {
  /// Only the values that are safe to hand out.
  pub fn ready(&self) -> BTreeMap<String, String> {
    self
      .outputs
      .iter()
      .filter_map(|(name, v)| Some((name.clone(), v.ready_value()?.to_string())))
      .collect()
  }

  pub fn get(&self, name: &str) -> Option<&OutputValue> {
    self.outputs.get(name)
  }

  pub fn is_complete(&self) -> bool {
    self.outputs.values().all(|v| matches!(v, OutputValue::Ready { .. }))
  }
}

/// Resolve every output template of `manifest` against a reconciliation.
pub fn publish(manifest: &Manifest, graph: &ResourceGraph, result: &ReconcileResult) -> PublishedOutputs {
  let outputs = manifest
    .outputs
    .iter()
    .map(|(name, template)| {
      let value = publish_one(template, graph, result);
      match &value {
        OutputValue::Ready { value } => info!(output = %name, %value, "output ready"),
        OutputValue::Blocked { missing } => warn!(output = %name, ?missing, "output blocked"),
        OutputValue::Invalid { reason } => warn!(output = %name, %reason, "output invalid"),
      }
      (name.clone(), value)
    })
    .collect();

  PublishedOutputs { outputs }
}

fn publish_one(template: &str, graph: &ResourceGraph, result: &ReconcileResult) -> OutputValue {
  let references = match placeholder::references(template) {
    Ok(refs) => refs,
    Err(e) => return OutputValue::Invalid { reason: e.to_string() },
  };

  let mut required = BTreeSet::new();
  for reference in &references {
    required.insert(reference.resource.clone());
    required.extend(graph.ancestors(&reference.resource));
  }

  let missing: Vec<String> = required.into_iter().filter(|r| !result.succeeded(r)).collect();
  if !missing.is_empty() {
    return OutputValue::Blocked { missing };
  }

  let mut resolver = AttributeResolver::default();
  for reference in &references {
    if let Some(attrs) = result.attributes(&reference.resource) {
      resolver.insert(reference.resource.clone(), attrs.clone());
    }
  }

  match placeholder::substitute(template, &resolver) {
    Ok(value) if value.trim().is_empty() => OutputValue::Invalid {
      reason: "resolved to an empty value".to_string(),
    },
    Ok(value) if placeholder::has_references(&value) => OutputValue::Invalid {
      reason: format!("still contains unresolved references: {}", value),
    },
    Ok(value) => OutputValue::Ready { value },
    Err(e) => OutputValue::Invalid { reason: e.to_string() },
  }
}
