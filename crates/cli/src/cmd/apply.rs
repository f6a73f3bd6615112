//! Implementation of the `sitestack apply` command.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use sitestack_lib::execute::{ApplyResult, NodeAction, apply};
use sitestack_lib::outputs::OutputValue;

use super::{StackContext, runtime};
use crate::output::{
  format_duration, print_change, print_error, print_json, print_stat, print_success, print_warning, symbols,
};

/// Deploy a stack file.
///
/// Exits non-zero when any resource failed, was blocked, or an output could
/// not be published; whatever did reconcile stays in place.
pub fn cmd_apply(file: &str, parallelism: Option<usize>, ctx: &StackContext) -> Result<ExitCode> {
  let path = Path::new(file);
  let mut options = ctx.apply_options();
  if let Some(parallelism) = parallelism {
    options.execute.parallelism = parallelism.max(1);
  }
  let provider = Arc::new(ctx.provider());

  let started = Instant::now();
  let result = runtime()?
    .block_on(apply(path, &options, provider))
    .with_context(|| format!("Failed to apply {}", file))?;
  info!(elapsed = ?started.elapsed(), "apply finished");

  if ctx.format.is_json() {
    print_json(&to_json(&result))?;
  } else {
    print_summary(&result, started.elapsed());
  }

  Ok(if result.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn print_summary(result: &ApplyResult, elapsed: std::time::Duration) {
  for name in &result.teardown.deleted {
    print_change(symbols::REMOVE, name, "deleted");
  }
  for name in &result.teardown.retained {
    print_change(symbols::REMOVE, name, "retained");
  }
  for (name, node) in &result.reconcile.reconciled {
    match &node.action {
      NodeAction::Created => print_change(symbols::ADD, name, "created"),
      NodeAction::Updated { fields } => print_change(symbols::MODIFY, name, &format!("updated: {}", fields.join(", "))),
      NodeAction::Unchanged => {}
    }
  }
  for (name, err) in result.reconcile.failed.iter().chain(&result.teardown.failed) {
    print_change(symbols::ERROR, name, &err.to_string());
  }
  for (name, root) in result.reconcile.blocked.iter().chain(&result.teardown.blocked) {
    print_change(symbols::WAIT, name, &format!("blocked by {}", root));
  }

  println!();
  if result.is_success() {
    print_success(&format!("Apply complete in {}", format_duration(elapsed)));
  } else {
    print_error("Apply finished with errors");
  }
  print_stat("Snapshot", &result.snapshot.id);
  print_stat("Created", &result.reconcile.created().to_string());
  print_stat("Updated", &result.reconcile.updated().to_string());
  print_stat("Unchanged", &result.reconcile.unchanged().to_string());
  print_stat("Deleted", &result.teardown.deleted.len().to_string());

  if result.outputs.outputs.is_empty() {
    return;
  }
  println!();
  println!("Outputs:");
  for (name, value) in &result.outputs.outputs {
    match value {
      OutputValue::Ready { value } => print_stat(name, value),
      OutputValue::Blocked { missing } => {
        print_warning(&format!("{} not published: waiting on {}", name, missing.join(", ")))
      }
      OutputValue::Invalid { reason } => print_warning(&format!("{} not published: {}", name, reason)),
    }
  }
}

fn to_json(result: &ApplyResult) -> serde_json::Value {
  let failed: serde_json::Map<_, _> = result
    .reconcile
    .failed
    .iter()
    .chain(&result.teardown.failed)
    .map(|(name, err)| (name.clone(), serde_json::Value::String(err.to_string())))
    .collect();
  let resources: serde_json::Map<_, _> = result
    .reconcile
    .reconciled
    .iter()
    .map(|(name, node)| (name.clone(), serde_json::to_value(&node.action).unwrap_or_default()))
    .collect();

  serde_json::json!({
    "success": result.is_success(),
    "snapshot": result.snapshot.id,
    "resources": resources,
    "failed": failed,
    "blocked": result.reconcile.blocked,
    "deleted": result.teardown.deleted,
    "retained": result.teardown.retained,
    "outputs": result.outputs,
  })
}
