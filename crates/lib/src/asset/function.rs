//! Function code directories.

use std::fs;
use std::path::{Path, PathBuf};

use super::AssetError;
use crate::resource::FunctionSpec;

fn module_extensions(runtime: &str) -> &'static [&'static str] {
  if runtime.starts_with("nodejs") {
    &["js", "mjs", "cjs"]
  } else if runtime.starts_with("python") {
    &["py"]
  } else if runtime.starts_with("ruby") {
    &["rb"]
  } else {
    &[]
  }
}

/// Locate the handler module inside the code directory and check it mentions
/// the exported handler name.
///
/// Returns the path of the module file.
pub fn verify_entry_point(resource: &str, spec: &FunctionSpec) -> Result<PathBuf, AssetError> {
  let code = Path::new(&spec.code);
  if !code.is_dir() {
    return Err(AssetError::Missing {
      resource: resource.to_string(),
      path: code.to_path_buf(),
    });
  }

  let (module, export) = spec.handler_parts().ok_or_else(|| AssetError::InvalidHandler {
    resource: resource.to_string(),
    handler: spec.handler.clone(),
  })?;

  let extensions = module_extensions(&spec.runtime);
  let found = if extensions.is_empty() {
    find_any_extension(code, module)
  } else {
    extensions
      .iter()
      .map(|ext| code.join(format!("{}.{}", module, ext)))
      .find(|p| p.is_file())
  };
  let file = found.ok_or_else(|| AssetError::HandlerModuleMissing {
    resource: resource.to_string(),
    module: module.to_string(),
    dir: code.to_path_buf(),
  })?;

  let source = fs::read_to_string(&file).map_err(|e| AssetError::Unreadable {
    path: file.clone(),
    message: e.to_string(),
  })?;
  if !source.contains(export) {
    return Err(AssetError::HandlerExportMissing {
      resource: resource.to_string(),
      export: export.to_string(),
      file,
    });
  }

  Ok(file)
}

fn find_any_extension(code: &Path, module: &str) -> Option<PathBuf> {
  let module_path = code.join(module);
  let dir = module_path.parent()?;
  let stem = module_path.file_name()?.to_string_lossy().into_owned();
  let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
    .ok()?
    .filter_map(Result::ok)
    .map(|e| e.path())
    .filter(|p| p.is_file() && p.file_stem().is_some_and(|s| s.to_string_lossy() == stem))
    .collect();
  candidates.sort();
  candidates.into_iter().next()
}
