//! Implementation of the `sitestack graph` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use sitestack_lib::eval::{EvalOptions, evaluate_stack};
use sitestack_lib::graph::ResourceGraph;

use super::StackContext;
use crate::output::print_json;

/// Validate a stack file and print its dependency graph.
///
/// Text output is DOT; JSON output lists the reconciliation waves.
pub fn cmd_graph(file: &str, ctx: &StackContext) -> Result<ExitCode> {
  let options = EvalOptions {
    stack: ctx.stack.clone(),
    region: ctx.region.clone(),
  };
  let manifest =
    evaluate_stack(Path::new(file), &options).with_context(|| format!("Failed to evaluate stack file: {}", file))?;
  let graph = ResourceGraph::from_manifest(&manifest).context("Invalid stack")?;

  if ctx.format.is_json() {
    print_json(&serde_json::json!({
      "order": graph.topological_order(),
      "waves": graph.waves(),
    }))?;
  } else {
    print!("{}", graph.to_dot());
  }

  Ok(ExitCode::SUCCESS)
}
