//! Stack file evaluation.
//!
//! Runs a Lua stack file against the `stack` global and returns the manifest
//! of everything it declared. Evaluation never touches live resources.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use tracing::info;

use crate::consts::{DEFAULT_REGION, DEFAULT_STACK_NAME};
use crate::lua::globals::StackContext;
use crate::lua::runtime;
use crate::manifest::Manifest;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  #[error("stack file not found: {0}")]
  NotFound(PathBuf),

  #[error("lua error: {0}")]
  Lua(#[from] LuaError),
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
  pub stack: String,
  pub region: String,
}

impl Default for EvalOptions {
  fn default() -> Self {
    Self {
      stack: DEFAULT_STACK_NAME.to_string(),
      region: DEFAULT_REGION.to_string(),
    }
  }
}

/// Evaluate a stack file into a manifest.
///
/// The manifest is not validated; see [`crate::graph::ResourceGraph::from_manifest`].
pub fn evaluate_stack(path: &Path, options: &EvalOptions) -> Result<Manifest, EvalError> {
  if !path.exists() {
    return Err(EvalError::NotFound(path.to_path_buf()));
  }

  let manifest = Rc::new(RefCell::new(Manifest::new(&options.stack)));
  let ctx = StackContext {
    name: options.stack.clone(),
    region: options.region.clone(),
  };

  // The runtime holds clones of `manifest`; drop it before taking the value out.
  {
    let lua = runtime::create_runtime(manifest.clone(), &ctx)?;
    runtime::load_file(&lua, path)?;
  }

  let manifest = Rc::try_unwrap(manifest)
    .map(RefCell::into_inner)
    .unwrap_or_else(|shared| shared.borrow().clone());

  info!(
    stack = %manifest.stack,
    resources = manifest.resources.len(),
    outputs = manifest.outputs.len(),
    "evaluated stack file"
  );
  Ok(manifest)
}
