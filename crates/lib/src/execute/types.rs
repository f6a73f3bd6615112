//! Types for reconciliation and teardown.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::graph::GraphError;
use crate::placeholder::PlaceholderError;
use crate::provider::{LiveResource, ProviderError};
use crate::resource::ResourceKind;

/// Errors that fail a single node.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("placeholder error: {0}")]
  Placeholder(#[from] PlaceholderError),

  #[error("resolved props of {kind} '{resource}' are invalid: {message}")]
  InvalidProps {
    resource: String,
    kind: ResourceKind,
    message: String,
  },

  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("resource not found in manifest: {0}")]
  NotInManifest(String),

  #[error("task for '{resource}' did not complete: {message}")]
  Task { resource: String, message: String },
}

/// What reconciliation did to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NodeAction {
  Created,
  Updated { fields: Vec<String> },
  Unchanged,
}

impl NodeAction {
  pub fn is_mutation(&self) -> bool {
    !matches!(self, NodeAction::Unchanged)
  }
}

/// A successfully reconciled node.
#[derive(Debug, Clone)]
pub struct NodeResult {
  pub action: NodeAction,
  /// Live state after reconciliation.
  pub live: LiveResource,
}

/// Outcome of one reconciliation pass.
///
/// Every node of the graph lands in exactly one of the three maps.
#[derive(Debug, Default)]
pub struct ReconcileResult {
  pub reconciled: BTreeMap<String, NodeResult>,

  /// Nodes whose own reconciliation failed.
  pub failed: BTreeMap<String, ExecuteError>,

  /// Nodes never attempted, mapped to the failed node that blocked them.
  pub blocked: BTreeMap<String, String>,
}

impl ReconcileResult {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.blocked.is_empty()
  }

  pub fn succeeded(&self, name: &str) -> bool {
    self.reconciled.contains_key(name)
  }

  pub fn attributes(&self, name: &str) -> Option<&BTreeMap<String, String>> {
    self.reconciled.get(name).map(|r| &r.live.attributes)
  }

  pub fn created(&self) -> usize {
    self.count(|a| matches!(a, NodeAction::Created))
  }

  pub fn updated(&self) -> usize {
    self.count(|a| matches!(a, NodeAction::Updated { .. }))
  }

  pub fn unchanged(&self) -> usize {
    self.count(|a| matches!(a, NodeAction::Unchanged))
  }

  pub fn total(&self) -> usize {
    self.reconciled.len() + self.failed.len() + self.blocked.len()
  }

  fn count(&self, pred: impl Fn(&NodeAction) -> bool) -> usize {
    self.reconciled.values().filter(|r| pred(&r.action)).count()
  }
}

/// Outcome of deleting resources.
#[derive(Debug, Default)]
pub struct TeardownResult {
  pub deleted: Vec<String>,

  /// Resources left in place because their removal policy is `retain`.
  pub retained: Vec<String>,

  pub failed: BTreeMap<String, ExecuteError>,

  /// Resources kept because a dependent of theirs could not be deleted.
  pub blocked: BTreeMap<String, String>,
}

impl TeardownResult {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.blocked.is_empty()
  }

  /// Names that still exist as far as this run knows.
  pub fn remaining(&self) -> impl Iterator<Item = &String> {
    self.failed.keys().chain(self.blocked.keys())
  }

  pub fn merge(&mut self, other: TeardownResult) {
    self.deleted.extend(other.deleted);
    self.retained.extend(other.retained);
    self.failed.extend(other.failed);
    self.blocked.extend(other.blocked);
  }
}

/// Predicted action of a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
  Create,
  Update { fields: Vec<String> },
  Unchanged,
  /// Depends on attributes that only exist after an earlier node is created.
  Pending { waiting_on: String },
  Delete,
  Retain,
}

/// Configuration for reconciliation.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of provider calls in flight.
  pub parallelism: usize,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
