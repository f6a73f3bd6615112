//! Implementation of the `sitestack plan` command.
//!
//! Evaluates the stack file and compares it against recorded and live state
//! using reads only.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use sitestack_lib::execute::{PlanResult, PlannedAction, plan_stack};

use super::{StackContext, runtime};
use crate::output::{print_change, print_info, print_json, symbols};

pub fn cmd_plan(file: &str, ctx: &StackContext) -> Result<ExitCode> {
  let path = Path::new(file);
  let options = ctx.apply_options();
  let provider = ctx.provider();

  let result = runtime()?
    .block_on(plan_stack(path, &options, &provider))
    .with_context(|| format!("Failed to plan {}", file))?;

  if ctx.format.is_json() {
    print_json(&serde_json::json!({
      "stack": ctx.stack,
      "resources": result.actions,
      "removals": result.removals,
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  if !result.has_changes() {
    print_info(&format!("Stack '{}' is up to date", ctx.stack));
    return Ok(ExitCode::SUCCESS);
  }

  println!("Plan for stack '{}':", ctx.stack);
  print_plan(&result);
  Ok(ExitCode::SUCCESS)
}

fn print_plan(result: &PlanResult) {
  let mut counts = [0usize; 4];

  for (name, action) in result.actions.iter().chain(&result.removals) {
    match action {
      PlannedAction::Create => {
        counts[0] += 1;
        print_change(symbols::ADD, name, "create");
      }
      PlannedAction::Update { fields } => {
        counts[1] += 1;
        print_change(symbols::MODIFY, name, &format!("update: {}", fields.join(", ")));
      }
      PlannedAction::Pending { waiting_on } => {
        counts[1] += 1;
        print_change(symbols::WAIT, name, &format!("known after {} is created", waiting_on));
      }
      PlannedAction::Delete => {
        counts[2] += 1;
        print_change(symbols::REMOVE, name, "delete");
      }
      PlannedAction::Retain => {
        counts[3] += 1;
        print_change(symbols::REMOVE, name, "retain, left in place");
      }
      PlannedAction::Unchanged => {}
    }
  }

  println!();
  println!(
    "{} to create, {} to change, {} to delete, {} to retain",
    counts[0], counts[1], counts[2], counts[3]
  );
}
