//! Reconciliation driver.
//!
//! Walks the resource graph wave by wave and brings every live resource in
//! line with its declaration:
//! - nodes of one wave run concurrently, bounded by a semaphore
//! - each node resolves its references from the attributes its ancestors
//!   reported in this run, reads live state, then creates, updates or leaves
//!   the resource alone
//! - a failed node blocks every transitive dependent; independent nodes carry
//!   on and nothing already reconciled is rolled back
//!
//! Removed resources are torn down in reverse dependency order by
//! [`teardown`]; [`plan`] predicts what a run would do using reads only.

pub mod apply;
pub mod resolver;
pub mod types;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::asset::PreparedAssets;
use crate::graph::ResourceGraph;
use crate::manifest::Manifest;
use crate::placeholder::Resolver;
use crate::provider::{DesiredResource, Provider};
use crate::resource::{RemovalPolicy, ResourceDef, ResourceSpec};
use crate::util::hash::ContentHash;

pub use apply::{ApplyError, ApplyOptions, ApplyResult, DestroyResult, PlanResult, apply, destroy, plan_stack};
pub use resolver::AttributeResolver;
pub use types::{
  ExecuteConfig, ExecuteError, NodeAction, NodeResult, PlannedAction, ReconcileResult, TeardownResult,
};

/// Reconcile every resource of a validated graph.
///
/// Never returns early: per-node failures are collected in the result.
pub async fn reconcile<P: Provider>(
  manifest: &Manifest,
  graph: &ResourceGraph,
  provider: Arc<P>,
  assets: &PreparedAssets,
  config: &ExecuteConfig,
) -> ReconcileResult {
  let waves = graph.waves();
  info!(resources = graph.len(), waves = waves.len(), "starting reconciliation");

  let mut result = ReconcileResult::default();
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, resources = wave.len(), "reconciling wave");

    let mut join_set = JoinSet::new();
    let mut tasks = HashMap::new();

    for name in wave {
      let failed_dep = graph
        .dependencies(name)
        .into_iter()
        .find_map(|dep| blocking_root(&dep, &result.failed, &result.blocked));
      if let Some(root) = failed_dep {
        warn!(resource = %name, failed_dep = %root, "skipping resource due to failed dependency");
        result.blocked.insert(name.clone(), root);
        continue;
      }

      let Some(def) = manifest.resources.get(name).cloned() else {
        result.failed.insert(name.clone(), ExecuteError::NotInManifest(name.clone()));
        continue;
      };
      let resolver = AttributeResolver::for_node(name, graph, &result);
      let asset_hash = assets.hash(name).cloned();
      let provider = provider.clone();
      let semaphore = semaphore.clone();

      let handle = join_set.spawn(async move {
        let _permit = semaphore.acquire().await.map_err(|e| ExecuteError::Task {
          resource: def.name.clone(),
          message: e.to_string(),
        })?;
        reconcile_node(provider.as_ref(), &def, &resolver, asset_hash).await
      });
      tasks.insert(handle.id(), name.clone());
    }

    for (name, outcome) in collect_join_results(join_set, tasks).await {
      match outcome {
        Ok(node) => {
          info!(resource = %name, action = ?node.action, "resource reconciled");
          result.reconciled.insert(name, node);
        }
        Err(e) => {
          error!(resource = %name, error = %e, "resource failed");
          result.failed.insert(name, e);
        }
      }
    }
  }

  info!(
    created = result.created(),
    updated = result.updated(),
    unchanged = result.unchanged(),
    failed = result.failed.len(),
    blocked = result.blocked.len(),
    "reconciliation complete"
  );

  result
}

/// Bring one resource in line with its declaration.
async fn reconcile_node<P: Provider>(
  provider: &P,
  def: &ResourceDef,
  resolver: &impl Resolver,
  asset_hash: Option<ContentHash>,
) -> Result<NodeResult, ExecuteError> {
  let desired = desired_resource(def, resolver, asset_hash)?;

  match provider.read(def.kind, &def.name).await? {
    None => {
      debug!(resource = %def.name, kind = %def.kind, "creating");
      let live = provider.create(&desired).await?;
      Ok(NodeResult {
        action: NodeAction::Created,
        live,
      })
    }
    Some(current) => {
      let fields = current.changed_fields(&desired);
      if fields.is_empty() {
        return Ok(NodeResult {
          action: NodeAction::Unchanged,
          live: current,
        });
      }
      debug!(resource = %def.name, ?fields, "updating");
      let live = provider.update(&desired, &current).await?;
      Ok(NodeResult {
        action: NodeAction::Updated { fields },
        live,
      })
    }
  }
}

fn desired_resource(
  def: &ResourceDef,
  resolver: &impl Resolver,
  asset_hash: Option<ContentHash>,
) -> Result<DesiredResource, ExecuteError> {
  let props = def.resolved_props(resolver)?;
  let spec = ResourceSpec::from_props(def.kind, &props).map_err(|e| ExecuteError::InvalidProps {
    resource: def.name.clone(),
    kind: def.kind,
    message: e.to_string(),
  })?;
  Ok(DesiredResource::new(&def.name, spec).with_asset_hash(asset_hash))
}

/// Delete the named resources of `manifest` in reverse dependency order.
///
/// Resources whose removal policy is `retain` are left in place. A resource
/// stays while any of its dependents failed to go.
pub async fn teardown<P: Provider>(
  manifest: &Manifest,
  names: &BTreeSet<String>,
  provider: Arc<P>,
  config: &ExecuteConfig,
) -> Result<TeardownResult, ExecuteError> {
  let ordering = ResourceGraph::ordering(manifest)?;
  info!(resources = names.len(), "starting teardown");

  let mut result = TeardownResult::default();
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

  for wave in ordering.waves().into_iter().rev() {
    let mut join_set = JoinSet::new();
    let mut tasks = HashMap::new();

    for name in wave.into_iter().filter(|n| names.contains(n)) {
      let Some(def) = manifest.resources.get(&name) else {
        continue;
      };

      if def.removal == RemovalPolicy::Retain {
        info!(resource = %name, "retaining resource");
        result.retained.push(name);
        continue;
      }

      let failed_dep = ordering
        .dependents(&name)
        .into_iter()
        .find_map(|dep| blocking_root(&dep, &result.failed, &result.blocked));
      if let Some(root) = failed_dep {
        warn!(resource = %name, failed_dependent = %root, "keeping resource still in use");
        result.blocked.insert(name, root);
        continue;
      }

      let kind = def.kind;
      let provider = provider.clone();
      let semaphore = semaphore.clone();
      let task_name = name.clone();
      let handle = join_set.spawn(async move {
        let _permit = semaphore.acquire().await.map_err(|e| ExecuteError::Task {
          resource: task_name.clone(),
          message: e.to_string(),
        })?;
        match provider.read(kind, &task_name).await? {
          Some(current) => provider.delete(&current).await.map_err(ExecuteError::from),
          None => {
            debug!(resource = %task_name, "already absent");
            Ok(())
          }
        }
      });
      tasks.insert(handle.id(), name);
    }

    for (name, outcome) in collect_join_results(join_set, tasks).await {
      match outcome {
        Ok(()) => {
          info!(resource = %name, "resource deleted");
          result.deleted.push(name);
        }
        Err(e) => {
          error!(resource = %name, error = %e, "deletion failed");
          result.failed.insert(name, e);
        }
      }
    }
  }

  result.deleted.sort();
  result.retained.sort();
  Ok(result)
}

/// Predict the action for every node without mutating anything.
pub async fn plan<P: Provider>(
  manifest: &Manifest,
  graph: &ResourceGraph,
  provider: &P,
  assets: &PreparedAssets,
) -> Result<BTreeMap<String, PlannedAction>, ExecuteError> {
  let mut planned: BTreeMap<String, PlannedAction> = BTreeMap::new();
  let mut live_attributes: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

  for name in graph.topological_order() {
    let def = manifest
      .resources
      .get(&name)
      .ok_or_else(|| ExecuteError::NotInManifest(name.clone()))?;

    let Some(current) = provider.read(def.kind, &name).await? else {
      planned.insert(name, PlannedAction::Create);
      continue;
    };

    let waiting_on = def.references()?.into_iter().map(|r| r.resource).find(|r| {
      matches!(
        planned.get(r),
        Some(PlannedAction::Create | PlannedAction::Pending { .. })
      )
    });

    let action = match waiting_on {
      Some(waiting_on) => PlannedAction::Pending { waiting_on },
      None => {
        let mut resolver = AttributeResolver::default();
        for ancestor in graph.ancestors(&name) {
          if let Some(attrs) = live_attributes.get(&ancestor) {
            resolver.insert(ancestor, attrs.clone());
          }
        }
        let desired = desired_resource(def, &resolver, assets.hash(&name).cloned())?;
        let fields = current.changed_fields(&desired);
        if fields.is_empty() {
          PlannedAction::Unchanged
        } else {
          PlannedAction::Update { fields }
        }
      }
    };

    live_attributes.insert(name.clone(), current.attributes);
    planned.insert(name, action);
  }

  Ok(planned)
}

/// If `dep` failed or was blocked, the failed node at the root of it.
fn blocking_root(
  dep: &str,
  failed: &BTreeMap<String, ExecuteError>,
  blocked: &BTreeMap<String, String>,
) -> Option<String> {
  if failed.contains_key(dep) {
    return Some(dep.to_string());
  }
  blocked.get(dep).cloned()
}

/// Collect results from a JoinSet of per-resource tasks.
///
/// A panicked task is reported as a failure of its resource.
async fn collect_join_results<T: 'static>(
  mut join_set: JoinSet<Result<T, ExecuteError>>,
  mut tasks: HashMap<Id, String>,
) -> Vec<(String, Result<T, ExecuteError>)> {
  let mut results = Vec::new();

  while let Some(joined) = join_set.join_next_with_id().await {
    match joined {
      Ok((id, outcome)) => {
        if let Some(name) = tasks.remove(&id) {
          results.push((name, outcome));
        }
      }
      Err(e) => {
        if let Some(name) = tasks.remove(&e.id()) {
          error!(resource = %name, error = %e, "resource task panicked");
          let message = e.to_string();
          results.push((
            name.clone(),
            Err(ExecuteError::Task {
              resource: name,
              message,
            }),
          ));
        }
      }
    }
  }

  results
}
