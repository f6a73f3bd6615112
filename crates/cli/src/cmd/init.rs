//! Implementation of the `sitestack init` command.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use sitestack_lib::init::{InitOptions, init};

use super::StackContext;
use crate::output::{print_json, symbols};

/// Scaffold a stack directory: `stack.lua`, a placeholder site, a handler and
/// an editor config for LuaLS.
pub fn cmd_init(path: &str, ctx: &StackContext) -> Result<ExitCode> {
  let options = InitOptions {
    dir: Path::new(path).to_path_buf(),
  };

  let result = init(&options).context("Failed to initialize stack")?;

  if ctx.format.is_json() {
    print_json(&serde_json::json!({
      "dir": result.dir,
      "stack_file": result.stack_file,
      "files": result.files,
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  println!("{} {}", symbols::SUCCESS.green(), "Initialized stack!".green().bold());
  println!();
  for file in &result.files {
    println!("  {} {}", symbols::INFO.cyan(), file.display());
  }
  println!();
  println!("{}", "Next steps:".bold());
  println!("  1. Edit {} to shape your stack", result.stack_file.display().to_string().cyan());
  println!(
    "  2. Run: {}",
    format!("sitestack apply {}", result.stack_file.display()).cyan()
  );

  Ok(ExitCode::SUCCESS)
}
