//! Apply orchestration.
//!
//! `apply` runs one full pass over a stack:
//!
//! 1. Lock the stack's state directory
//! 2. Load the previous snapshot
//! 3. Evaluate the stack file and validate its graph
//! 4. Check and hash assets
//! 5. Reconcile every declared resource
//! 6. Tear down resources that left the stack, in reverse dependency order
//! 7. Publish outputs
//! 8. Save a snapshot carrying only the outputs that are ready
//!
//! A resource whose kind changed is the exception to step 6: its old
//! incarnation is deleted before step 5 so the name is free again.
//!
//! Steps 3 and 4 fail the run before any provider call. From step 5 on,
//! failures are collected per resource and nothing is rolled back; the next
//! run re-reads live state and continues from there.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::asset::{AssetError, preflight};
use crate::consts::{DEFAULT_REGION, DEFAULT_STACK_NAME};
use crate::eval::{EvalError, EvalOptions, evaluate_stack};
use crate::graph::{GraphError, ResourceGraph};
use crate::manifest::Manifest;
use crate::outputs::{PublishedOutputs, publish};
use crate::platform::paths::stack_dir;
use crate::provider::Provider;
use crate::resource::{RemovalPolicy, ResourceDef};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotStore, StateDiff, compute_diff, generate_snapshot_id};
use crate::state_lock::{LockMode, StateLock, StateLockError};

use super::types::{ExecuteConfig, ExecuteError, PlannedAction, ReconcileResult, TeardownResult};
use super::{plan, reconcile, teardown};

#[derive(Debug, Error)]
pub enum ApplyError {
  #[error("evaluation error: {0}")]
  Eval(#[from] EvalError),

  #[error("invalid stack: {0}")]
  Graph(#[from] GraphError),

  #[error("asset error: {0}")]
  Asset(#[from] AssetError),

  #[error("snapshot error: {0}")]
  Snapshot(#[from] SnapshotError),

  #[error(transparent)]
  Lock(#[from] StateLockError),

  #[error("execution error: {0}")]
  Execute(#[from] ExecuteError),
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
  pub stack: String,
  pub region: String,
  pub execute: ExecuteConfig,
  /// Overrides the stack's default state directory.
  pub state_dir: Option<PathBuf>,
}

impl Default for ApplyOptions {
  fn default() -> Self {
    Self {
      stack: DEFAULT_STACK_NAME.to_string(),
      region: DEFAULT_REGION.to_string(),
      execute: ExecuteConfig::default(),
      state_dir: None,
    }
  }
}

impl ApplyOptions {
  pub fn state_dir(&self) -> PathBuf {
    self.state_dir.clone().unwrap_or_else(|| stack_dir(&self.stack))
  }

  pub fn snapshot_store(&self) -> SnapshotStore {
    SnapshotStore::in_state_dir(&self.state_dir())
  }

  fn eval_options(&self) -> EvalOptions {
    EvalOptions {
      stack: self.stack.clone(),
      region: self.region.clone(),
    }
  }
}

#[derive(Debug)]
pub struct ApplyResult {
  pub snapshot: Snapshot,
  pub diff: StateDiff,
  pub teardown: TeardownResult,
  pub reconcile: ReconcileResult,
  pub outputs: PublishedOutputs,
}

impl ApplyResult {
  pub fn is_success(&self) -> bool {
    self.teardown.is_success() && self.reconcile.is_success() && self.outputs.is_complete()
  }
}

#[derive(Debug)]
pub struct DestroyResult {
  pub teardown: TeardownResult,
  /// False when nothing was recorded for the stack.
  pub had_state: bool,
}

#[derive(Debug)]
pub struct PlanResult {
  pub diff: StateDiff,
  /// Predicted action per declared resource.
  pub actions: BTreeMap<String, PlannedAction>,
  /// Resources of the previous run that would be deleted or retained.
  pub removals: BTreeMap<String, PlannedAction>,
}

impl PlanResult {
  pub fn has_changes(&self) -> bool {
    !self.removals.is_empty() || self.actions.values().any(|a| *a != PlannedAction::Unchanged)
  }
}

/// Apply a stack file.
pub async fn apply<P: Provider>(
  config_path: &Path,
  options: &ApplyOptions,
  provider: Arc<P>,
) -> Result<ApplyResult, ApplyError> {
  info!(config = %config_path.display(), stack = %options.stack, "starting apply");

  let _lock = StateLock::acquire(&options.state_dir(), LockMode::Exclusive, "apply")?;
  let store = options.snapshot_store();
  let current = store.load_current()?;
  let previous = current.as_ref().map(Snapshot::managed_manifest);
  info!(has_current = current.is_some(), "loaded current state");

  let desired = evaluate_stack(config_path, &options.eval_options())?;
  let graph = ResourceGraph::from_manifest(&desired)?;
  let assets = preflight(&desired)?;

  let diff = compute_diff(&desired, previous.as_ref());
  info!(
    added = diff.added.len(),
    kept = diff.kept.len(),
    removed = diff.removed.len(),
    replaced = diff.replaced.len(),
    "computed diff"
  );

  let replaced: BTreeSet<String> = diff.replaced.iter().cloned().collect();
  let mut teardown = teardown_previous(previous.as_ref(), &replaced, provider.clone(), options).await?;

  let reconcile = reconcile(&desired, &graph, provider.clone(), &assets, &options.execute).await;

  let removed: BTreeSet<String> = diff.removed.iter().cloned().collect();
  teardown.merge(teardown_previous(previous.as_ref(), &removed, provider, options).await?);

  let outputs = publish(&desired, &graph, &reconcile);

  let pending = pending_deletion(previous.as_ref(), &desired, &teardown);
  let snapshot = Snapshot::new(generate_snapshot_id(), Some(config_path.to_path_buf()), desired)
    .with_outputs(outputs.ready())
    .with_pending_deletion(pending);
  store.save_and_set_current(&snapshot)?;

  info!(
    snapshot = %snapshot.id,
    success = reconcile.is_success() && teardown.is_success(),
    "apply complete"
  );

  Ok(ApplyResult {
    snapshot,
    diff,
    teardown,
    reconcile,
    outputs,
  })
}

/// Predict what `apply` would do, using reads only.
pub async fn plan_stack<P: Provider>(
  config_path: &Path,
  options: &ApplyOptions,
  provider: &P,
) -> Result<PlanResult, ApplyError> {
  let _lock = StateLock::acquire(&options.state_dir(), LockMode::Shared, "plan")?;
  let previous = options
    .snapshot_store()
    .load_current()?
    .map(|s| s.managed_manifest());

  let desired = evaluate_stack(config_path, &options.eval_options())?;
  let graph = ResourceGraph::from_manifest(&desired)?;
  let assets = preflight(&desired)?;
  let diff = compute_diff(&desired, previous.as_ref());

  let mut actions = plan(&desired, &graph, provider, &assets).await?;
  for name in &diff.replaced {
    actions.insert(name.clone(), PlannedAction::Create);
  }

  let removals = previous
    .as_ref()
    .map(|previous| {
      diff
        .to_delete()
        .into_iter()
        .filter_map(|name| {
          let def = previous.resources.get(&name)?;
          let action = match def.removal {
            RemovalPolicy::Retain => PlannedAction::Retain,
            RemovalPolicy::Destroy => PlannedAction::Delete,
          };
          Some((name, action))
        })
        .collect()
    })
    .unwrap_or_default();

  Ok(PlanResult {
    diff,
    actions,
    removals,
  })
}

/// Delete every resource the stack manages.
///
/// The current snapshot is cleared once everything is gone. Resources that
/// could not be deleted stay recorded so a later destroy retries them.
pub async fn destroy<P: Provider>(options: &ApplyOptions, provider: Arc<P>) -> Result<DestroyResult, ApplyError> {
  info!(stack = %options.stack, "starting destroy");

  let _lock = StateLock::acquire(&options.state_dir(), LockMode::Exclusive, "destroy")?;
  let store = options.snapshot_store();
  let Some(current) = store.load_current()? else {
    info!("no state recorded, nothing to destroy");
    return Ok(DestroyResult {
      teardown: TeardownResult::default(),
      had_state: false,
    });
  };

  let managed = current.managed_manifest();
  let names: BTreeSet<String> = managed.resources.keys().cloned().collect();
  let teardown = teardown(&managed, &names, provider, &options.execute).await?;

  if teardown.is_success() {
    store.clear_current()?;
  } else {
    let remaining: BTreeMap<String, ResourceDef> = teardown
      .remaining()
      .filter_map(|name| Some((name.clone(), managed.resources.get(name)?.clone())))
      .collect();
    warn!(remaining = remaining.len(), "destroy incomplete");
    let snapshot = Snapshot::new(generate_snapshot_id(), current.config_path.clone(), Manifest::new(&options.stack))
      .with_pending_deletion(remaining);
    store.save_and_set_current(&snapshot)?;
  }

  Ok(DestroyResult {
    teardown,
    had_state: true,
  })
}

async fn teardown_previous<P: Provider>(
  previous: Option<&Manifest>,
  names: &BTreeSet<String>,
  provider: Arc<P>,
  options: &ApplyOptions,
) -> Result<TeardownResult, ExecuteError> {
  match previous {
    Some(previous) if !names.is_empty() => teardown(previous, names, provider, &options.execute).await,
    _ => Ok(TeardownResult::default()),
  }
}

/// Removed resources that still exist after teardown.
///
/// A name now declared with a different kind cannot be tracked alongside the
/// new declaration and is dropped with a warning.
fn pending_deletion(
  previous: Option<&Manifest>,
  desired: &Manifest,
  teardown: &TeardownResult,
) -> BTreeMap<String, ResourceDef> {
  let Some(previous) = previous else {
    return BTreeMap::new();
  };

  teardown
    .remaining()
    .filter_map(|name| {
      if desired.resources.contains_key(name) {
        warn!(resource = %name, "replaced resource could not be deleted and is no longer tracked");
        return None;
      }
      Some((name.clone(), previous.resources.get(name)?.clone()))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::init::templates::STACK_LUA_TEMPLATE;
  use crate::outputs::OutputValue;
  use crate::provider::MemoryProvider;
  use crate::resource::ResourceKind;
  use crate::util::testutil::write_assets;
  use std::fs;
  use tempfile::TempDir;

  struct Fixture {
    _temp: TempDir,
    stack_file: PathBuf,
    options: ApplyOptions,
    provider: Arc<MemoryProvider>,
  }

  impl Fixture {
    fn new() -> Self {
      let temp = TempDir::new().unwrap();
      write_assets(temp.path());
      let stack_file = temp.path().join("stack.lua");
      fs::write(&stack_file, STACK_LUA_TEMPLATE).unwrap();
      let options = ApplyOptions {
        state_dir: Some(temp.path().join("state")),
        ..Default::default()
      };
      Self {
        _temp: temp,
        stack_file,
        options,
        provider: Arc::new(MemoryProvider::default()),
      }
    }

    fn rewrite(&self, content: &str) {
      fs::write(&self.stack_file, content).unwrap();
    }

    async fn apply(&self) -> Result<ApplyResult, ApplyError> {
      apply(&self.stack_file, &self.options, self.provider.clone()).await
    }
  }

  #[tokio::test]
  async fn first_apply_creates_stack_and_publishes_outputs() {
    let fx = Fixture::new();
    let result = fx.apply().await.unwrap();

    assert!(result.is_success(), "{:?}", result.reconcile.failed);
    assert_eq!(result.reconcile.created(), 9);
    assert_eq!(result.diff.added.len(), 9);
    assert_eq!(
      result.snapshot.outputs["websiteEndpoint"],
      "http://site.s3-website-us-east-1.amazonaws.com/"
    );
    assert!(result.snapshot.outputs["apiEndpoint"].ends_with("/dev"));

    let stored = fx.options.snapshot_store().load_current().unwrap().unwrap();
    assert_eq!(stored.id, result.snapshot.id);
  }

  #[tokio::test]
  async fn reapply_is_idempotent() {
    let fx = Fixture::new();
    fx.apply().await.unwrap();
    fx.provider.reset_counters();

    let result = fx.apply().await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.reconcile.unchanged(), 9);
    assert_eq!(fx.provider.mutations(), 0);
  }

  #[tokio::test]
  async fn changed_site_content_updates_only_upload() {
    let fx = Fixture::new();
    fx.apply().await.unwrap();
    fx.provider.reset_counters();

    let index = fx.stack_file.parent().unwrap().join("website/index.html");
    fs::write(index, "<h1>changed</h1>").unwrap();

    let result = fx.apply().await.unwrap();
    assert_eq!(result.reconcile.updated(), 1);
    assert!(matches!(
      &result.reconcile.reconciled["site_content"].action,
      crate::execute::NodeAction::Updated { fields } if fields == &vec!["asset".to_string()]
    ));
    assert_eq!(fx.provider.mutations(), 1);
  }

  #[tokio::test]
  async fn removed_resources_are_deleted() {
    let fx = Fixture::new();
    fx.apply().await.unwrap();

    let without_stage = STACK_LUA_TEMPLATE
      .split("local stage = ")
      .next()
      .unwrap()
      .to_string()
      + "stack.output(\"websiteEndpoint\", \"http://\" .. site.website_endpoint .. \"/\")\n";
    fx.rewrite(&without_stage);

    let result = fx.apply().await.unwrap();
    assert_eq!(result.diff.removed, vec!["stage"]);
    assert_eq!(result.teardown.deleted, vec!["stage"]);
    assert!(fx.provider.get(ResourceKind::Stage, "stage").is_none());
    assert!(!result.snapshot.outputs.contains_key("apiEndpoint"));
  }

  #[tokio::test]
  async fn renamed_function_is_deleted_after_its_successor_is_wired() {
    let fx = Fixture::new();
    fx.apply().await.unwrap();
    fx.provider.reset_counters();

    fx.rewrite(&STACK_LUA_TEMPLATE.replace("id = \"handler\",", "id = \"api_handler\","));
    let result = fx.apply().await.unwrap();
    assert!(result.is_success(), "{:?}", result.reconcile.failed);
    assert_eq!(result.teardown.deleted, vec!["handler"]);

    let history = fx.provider.history();
    let position = |entry: &str| {
      history
        .iter()
        .position(|h| h == entry)
        .unwrap_or_else(|| panic!("{entry}: {history:?}"))
    };
    assert!(position("create api_handler") < position("update integration"));
    assert_eq!(history.last().map(String::as_str), Some("delete handler"));
  }

  #[tokio::test]
  async fn invalid_runtime_blocks_api_output() {
    let fx = Fixture::new();
    fx.rewrite(&STACK_LUA_TEMPLATE.replace("nodejs16.x", "nodejs1.x"));

    let result = fx.apply().await.unwrap();
    assert!(!result.is_success());
    assert!(result.reconcile.failed.contains_key("handler"));
    for name in ["invoke", "integration", "route", "stage"] {
      assert!(result.reconcile.blocked.contains_key(name), "{name}");
    }
    assert!(matches!(
      result.outputs.get("apiEndpoint"),
      Some(OutputValue::Blocked { .. })
    ));
    assert!(!result.snapshot.outputs.contains_key("apiEndpoint"));
    assert!(result.snapshot.outputs.contains_key("websiteEndpoint"));
  }

  #[tokio::test]
  async fn static_errors_make_no_provider_calls() {
    let fx = Fixture::new();
    fx.rewrite(&STACK_LUA_TEMPLATE.replace("depends_on = { api, route }", "depends_on = { api }"));
    assert!(matches!(fx.apply().await, Err(ApplyError::Graph(_))));

    fx.rewrite(STACK_LUA_TEMPLATE);
    fs::remove_file(fx.stack_file.parent().unwrap().join("website/index.html")).unwrap();
    assert!(matches!(fx.apply().await, Err(ApplyError::Asset(_))));

    assert_eq!(fx.provider.reads(), 0);
    assert_eq!(fx.provider.mutations(), 0);
    assert!(fx.options.snapshot_store().load_current().unwrap().is_none());
  }

  #[tokio::test]
  async fn failed_removal_is_retried() {
    let fx = Fixture::new();
    fx.apply().await.unwrap();

    let without_stage = STACK_LUA_TEMPLATE.split("local stage = ").next().unwrap().to_string();
    fx.rewrite(&without_stage);
    fx.provider.fail_on("stage");
    let result = fx.apply().await.unwrap();
    assert!(result.teardown.failed.contains_key("stage"));
    assert!(result.snapshot.pending_deletion.contains_key("stage"));

    fx.provider.clear_failures();
    let result = fx.apply().await.unwrap();
    assert_eq!(result.teardown.deleted, vec!["stage"]);
    assert!(result.snapshot.pending_deletion.is_empty());
  }

  #[tokio::test]
  async fn destroy_removes_everything_and_clears_state() {
    let fx = Fixture::new();
    fx.apply().await.unwrap();

    let result = destroy(&fx.options, fx.provider.clone()).await.unwrap();
    assert!(result.had_state);
    assert!(result.teardown.is_success());
    assert_eq!(result.teardown.deleted.len(), 9);
    assert!(fx.provider.live().is_empty());
    assert!(fx.options.snapshot_store().load_current().unwrap().is_none());

    let again = destroy(&fx.options, fx.provider.clone()).await.unwrap();
    assert!(!again.had_state);
  }

  #[tokio::test]
  async fn plan_reports_creates_then_nothing() {
    let fx = Fixture::new();
    let planned = plan_stack(&fx.stack_file, &fx.options, fx.provider.as_ref()).await.unwrap();
    assert!(planned.has_changes());
    assert!(planned.actions.values().all(|a| *a == PlannedAction::Create));
    assert_eq!(fx.provider.mutations(), 0);

    fx.apply().await.unwrap();
    let planned = plan_stack(&fx.stack_file, &fx.options, fx.provider.as_ref()).await.unwrap();
    assert!(!planned.has_changes(), "{:?}", planned.actions);
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn concurrent_apply_is_refused() {
    let fx = Fixture::new();
    let _held = StateLock::acquire(&fx.options.state_dir(), LockMode::Exclusive, "apply").unwrap();
    assert!(matches!(
      fx.apply().await,
      Err(ApplyError::Lock(StateLockError::Contention { .. }))
    ));
  }
}
