//! Differences between the previous run's manifest and the desired one.

use std::collections::BTreeSet;

use crate::manifest::Manifest;

/// How the set of declared resources changed.
///
/// Property changes are not visible here; they surface when reconciliation
/// reads live state.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StateDiff {
  /// Declared now, not before.
  pub added: Vec<String>,

  /// Declared before and now, with the same kind.
  pub kept: Vec<String>,

  /// Declared before, not now.
  pub removed: Vec<String>,

  /// Declared before and now with a different kind. The old resource is
  /// removed before the new one is created.
  pub replaced: Vec<String>,
}

impl StateDiff {
  /// Resources of the previous manifest that must be torn down.
  pub fn to_delete(&self) -> BTreeSet<String> {
    self.removed.iter().chain(&self.replaced).cloned().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty() && self.replaced.is_empty()
  }
}

pub fn compute_diff(desired: &Manifest, current: Option<&Manifest>) -> StateDiff {
  let mut diff = StateDiff::default();

  for (name, def) in &desired.resources {
    match current.and_then(|m| m.resources.get(name)) {
      None => diff.added.push(name.clone()),
      Some(old) if old.kind != def.kind => diff.replaced.push(name.clone()),
      Some(_) => diff.kept.push(name.clone()),
    }
  }

  if let Some(current) = current {
    diff.removed = current
      .resources
      .keys()
      .filter(|name| !desired.resources.contains_key(*name))
      .cloned()
      .collect();
  }

  diff
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resource::ResourceKind;
  use crate::util::testutil::{def, sample_stack};
  use serde_json::json;

  #[test]
  fn first_run_adds_everything() {
    let diff = compute_diff(&sample_stack(), None);
    assert_eq!(diff.added.len(), 9);
    assert!(diff.to_delete().is_empty());
  }

  #[test]
  fn identical_manifests_have_empty_diff() {
    let manifest = sample_stack();
    let diff = compute_diff(&manifest, Some(&manifest));
    assert!(diff.is_empty());
    assert_eq!(diff.kept.len(), 9);
  }

  #[test]
  fn removed_and_replaced() {
    let current = sample_stack();
    let mut desired = sample_stack();
    desired.resources.remove("stage");
    desired
      .resources
      .insert("gateway".into(), def(ResourceKind::StorageBucket, "gateway", json!({}), &[]));

    let diff = compute_diff(&desired, Some(&current));
    assert_eq!(diff.removed, vec!["stage"]);
    assert_eq!(diff.replaced, vec!["gateway"]);
    assert_eq!(
      diff.to_delete(),
      BTreeSet::from(["gateway".to_string(), "stage".to_string()])
    );
  }
}
