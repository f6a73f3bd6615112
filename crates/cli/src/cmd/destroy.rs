//! Implementation of the `sitestack destroy` command.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};

use sitestack_lib::execute::destroy;

use super::{StackContext, runtime};
use crate::output::{print_change, print_error, print_info, print_json, print_stat, print_success, symbols};
use crate::prompts::confirm_destroy;

/// Delete every resource the stack manages, dependents first.
///
/// Resources declared with `removal = "retain"` are left in place and
/// forgotten.
pub fn cmd_destroy(force: bool, ctx: &StackContext) -> Result<ExitCode> {
  let options = ctx.apply_options();

  let managed = options
    .snapshot_store()
    .load_current()
    .context("Failed to load current snapshot")?
    .map(|s| s.managed_manifest().resources.len())
    .unwrap_or(0);

  if managed == 0 && !ctx.format.is_json() {
    print_info("Nothing to destroy.");
    return Ok(ExitCode::SUCCESS);
  }

  if managed > 0 && !confirm_destroy(&ctx.stack, managed, force)? {
    print_info("Destroy cancelled.");
    return Ok(ExitCode::SUCCESS);
  }

  let provider = Arc::new(ctx.provider());
  let result = runtime()?
    .block_on(destroy(&options, provider))
    .context("Destroy failed")?;
  let teardown = &result.teardown;

  if ctx.format.is_json() {
    let failed: serde_json::Map<_, _> = teardown
      .failed
      .iter()
      .map(|(name, err)| (name.clone(), serde_json::Value::String(err.to_string())))
      .collect();
    print_json(&serde_json::json!({
      "success": teardown.is_success(),
      "deleted": teardown.deleted,
      "retained": teardown.retained,
      "failed": failed,
      "blocked": teardown.blocked,
    }))?;
  } else if !result.had_state {
    print_info("Nothing to destroy.");
  } else {
    for name in &teardown.deleted {
      print_change(symbols::REMOVE, name, "deleted");
    }
    for name in &teardown.retained {
      print_change(symbols::REMOVE, name, "retained");
    }
    for (name, err) in &teardown.failed {
      print_change(symbols::ERROR, name, &err.to_string());
    }
    for (name, dependent) in &teardown.blocked {
      print_change(symbols::WAIT, name, &format!("kept while {} exists", dependent));
    }

    println!();
    if teardown.is_success() {
      print_success("Destroy complete!");
    } else {
      print_error("Destroy incomplete; run it again to retry");
    }
    print_stat("Deleted", &teardown.deleted.len().to_string());
    print_stat("Retained", &teardown.retained.len().to_string());
  }

  Ok(if teardown.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}
