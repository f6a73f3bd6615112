use std::io::{self, IsTerminal, Write};

use anyhow::{Result, bail};

/// Ask before deleting a stack's resources. `force` skips the question.
pub fn confirm_destroy(stack: &str, resources: usize, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("refusing to destroy stack '{stack}' without confirmation; pass --force in non-interactive mode");
  }

  write!(io::stderr(), "Delete {resources} resource(s) of stack '{stack}'? [y/N] ")?;
  io::stderr().flush()?;

  let mut input = String::new();
  io::stdin().read_line(&mut input)?;

  Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
