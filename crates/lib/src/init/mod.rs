//! Scaffold a new stack directory.
//!
//! Writes a stack file, a website with an `index.html`, a function handler
//! and a `.luarc.json` for LuaLS. Nothing is overwritten.

pub mod templates;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::consts::DEFAULT_STACK_FILE;

pub use templates::{HANDLER_JS_TEMPLATE, INDEX_HTML_TEMPLATE, LUARC_JSON_TEMPLATE, STACK_LUA_TEMPLATE};

#[derive(Debug, Error)]
pub enum InitError {
  #[error("file already exists: {}", path.display())]
  PathExists { path: PathBuf },

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },

  #[error("failed to canonicalize path {}: {source}", path.display())]
  Canonicalize { path: PathBuf, source: std::io::Error },
}

pub struct InitOptions {
  /// Directory to scaffold; created if missing.
  pub dir: PathBuf,
}

#[derive(Debug)]
pub struct InitResult {
  pub dir: PathBuf,
  pub stack_file: PathBuf,
  pub files: Vec<PathBuf>,
}

pub fn init(options: &InitOptions) -> Result<InitResult, InitError> {
  create_dir(&options.dir)?;
  let dir = dunce::canonicalize(&options.dir).map_err(|e| InitError::Canonicalize {
    path: options.dir.clone(),
    source: e,
  })?;

  let stack_file = dir.join(DEFAULT_STACK_FILE);
  let planned = [
    (stack_file.clone(), STACK_LUA_TEMPLATE),
    (dir.join("website").join("index.html"), INDEX_HTML_TEMPLATE),
    (dir.join("function").join("index.js"), HANDLER_JS_TEMPLATE),
    (dir.join(".luarc.json"), LUARC_JSON_TEMPLATE),
  ];

  // Refuse before writing anything.
  if let Some((path, _)) = planned.iter().find(|(path, _)| path.exists()) {
    return Err(InitError::PathExists { path: path.clone() });
  }

  let mut files = Vec::with_capacity(planned.len());
  for (path, content) in planned {
    if let Some(parent) = path.parent() {
      create_dir(parent)?;
    }
    fs::write(&path, content).map_err(|e| InitError::WriteFile {
      path: path.clone(),
      source: e,
    })?;
    files.push(path);
  }

  info!(dir = %dir.display(), "initialized stack directory");
  Ok(InitResult { dir, stack_file, files })
}

fn create_dir(path: &Path) -> Result<(), InitError> {
  fs::create_dir_all(path).map_err(|e| InitError::CreateDir {
    path: path.to_path_buf(),
    source: e,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asset::preflight;
  use crate::eval::{EvalOptions, evaluate_stack};
  use crate::graph::ResourceGraph;
  use tempfile::TempDir;

  #[test]
  fn scaffolds_a_valid_stack() {
    let temp = TempDir::new().unwrap();
    let result = init(&InitOptions {
      dir: temp.path().join("mysite"),
    })
    .unwrap();

    assert_eq!(result.files.len(), 4);
    assert!(result.stack_file.exists());
    assert!(result.dir.join("website/index.html").exists());

    let manifest = evaluate_stack(&result.stack_file, &EvalOptions::default()).unwrap();
    ResourceGraph::from_manifest(&manifest).unwrap();
    let assets = preflight(&manifest).unwrap();
    assert_eq!(assets.len(), 2);

    let runtime = manifest.resources["handler"].props.get("runtime").and_then(|v| v.as_str());
    assert_eq!(runtime, Some("nodejs16.x"));
  }

  #[test]
  fn refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(DEFAULT_STACK_FILE), "-- mine").unwrap();

    let err = init(&InitOptions {
      dir: temp.path().to_path_buf(),
    })
    .unwrap_err();
    assert!(err.to_string().contains(DEFAULT_STACK_FILE));
    assert!(!temp.path().join("website").exists());
    assert_eq!(fs::read_to_string(temp.path().join(DEFAULT_STACK_FILE)).unwrap(), "-- mine");
  }
}
