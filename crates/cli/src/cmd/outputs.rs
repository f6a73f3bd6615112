//! Implementation of the `sitestack outputs` command.

use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use sitestack_lib::state_lock::{LockMode, StateLock};

use super::StackContext;
use crate::output::{print_info, print_json, print_stat};

/// Print the outputs recorded by the last apply.
///
/// Only outputs whose resources all reconciled were recorded, so everything
/// printed here is usable.
pub fn cmd_outputs(name: Option<&str>, ctx: &StackContext) -> Result<ExitCode> {
  let options = ctx.apply_options();
  let _lock = StateLock::acquire(&options.state_dir(), LockMode::Shared, "outputs")?;
  let snapshot = options
    .snapshot_store()
    .load_current()
    .context("Failed to load current snapshot")?;

  let outputs = snapshot.map(|s| s.outputs).unwrap_or_default();

  if let Some(name) = name {
    let Some(value) = outputs.get(name) else {
      bail!("output '{}' is not available for stack '{}'", name, ctx.stack);
    };
    println!("{}", value);
    return Ok(ExitCode::SUCCESS);
  }

  if ctx.format.is_json() {
    print_json(&outputs)?;
  } else if outputs.is_empty() {
    print_info(&format!("No outputs recorded for stack '{}'. Run 'sitestack apply' first.", ctx.stack));
  } else {
    for (name, value) in &outputs {
      print_stat(name, value);
    }
  }

  Ok(ExitCode::SUCCESS)
}
