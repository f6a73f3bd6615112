//! Status command implementation.
//!
//! Displays the current snapshot of a stack: when it was taken, what it
//! manages and what is still waiting to be deleted.

use std::process::ExitCode;

use anyhow::{Context, Result};

use sitestack_lib::snapshot::SnapshotStore;

use super::StackContext;
use crate::output::{self, format_timestamp, print_info, print_json, print_stat, print_success, print_warning};

pub fn cmd_status(verbose: bool, ctx: &StackContext) -> Result<ExitCode> {
  let store = SnapshotStore::for_stack(&ctx.stack);
  let history = store.list().context("Failed to read snapshot index")?;

  let Some(snapshot) = store.load_current().context("Failed to load current snapshot")? else {
    if ctx.format.is_json() {
      print_json(&serde_json::json!({ "stack": ctx.stack, "snapshot": null, "history": history.len() }))?;
    } else {
      print_info(&format!("No state for stack '{}'. Run 'sitestack apply' to create it.", ctx.stack));
    }
    return Ok(ExitCode::SUCCESS);
  };

  if ctx.format.is_json() {
    let resources: Vec<_> = snapshot
      .manifest
      .resources
      .values()
      .map(|def| serde_json::json!({ "name": def.name, "kind": def.kind }))
      .collect();
    print_json(&serde_json::json!({
      "stack": ctx.stack,
      "snapshot": snapshot.id,
      "created_at": snapshot.created_at,
      "config_path": snapshot.config_path,
      "resources": resources,
      "outputs": snapshot.outputs,
      "pending_deletion": snapshot.pending_deletion.keys().collect::<Vec<_>>(),
      "history": history.len(),
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  print_success(&format!("Stack '{}' at snapshot {}", ctx.stack, snapshot.id));
  print_stat("Created", &format_timestamp(snapshot.created_at));
  if let Some(path) = &snapshot.config_path {
    print_stat("Stack file", &path.display().to_string());
  }
  print_stat("Resources", &snapshot.manifest.resources.len().to_string());
  print_stat("Outputs", &snapshot.outputs.len().to_string());
  print_stat("Snapshots", &history.len().to_string());

  if !snapshot.pending_deletion.is_empty() {
    let names: Vec<_> = snapshot.pending_deletion.keys().map(String::as_str).collect();
    print_warning(&format!("Awaiting deletion: {}", names.join(", ")));
  }

  if verbose && !snapshot.manifest.resources.is_empty() {
    println!();
    println!("Resources:");
    for def in snapshot.manifest.resources.values() {
      println!("  {} {} ({})", output::symbols::INFO, def.name, def.kind);
    }
  }

  Ok(ExitCode::SUCCESS)
}
