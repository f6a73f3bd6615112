use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use super::globals::{self, StackContext};
use crate::manifest::Manifest;

/// Create a Lua runtime with the `stack` global registered.
pub fn create_runtime(manifest: Rc<RefCell<Manifest>>, ctx: &StackContext) -> LuaResult<Lua> {
  let lua = Lua::new();
  globals::register_globals(&lua, manifest, ctx)?;
  Ok(lua)
}

/// Load and execute a stack file.
///
/// Sets `stack.dir` to the file's directory and lets `require` find modules
/// under its `lua/` subdirectory.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical_path = dunce::canonicalize(path)
    .map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", path.display(), e)))?;
  let content = std::fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;

  let dir = canonical_path
    .parent()
    .unwrap_or(Path::new("."))
    .to_string_lossy()
    .into_owned();
  lua.globals().get::<LuaTable>("stack")?.set("dir", dir.as_str())?;

  let package = lua.globals().get::<LuaTable>("package")?;
  let current: String = package.get("path")?;
  let lua_dir = dir.replace('\\', "/");
  package.set("path", format!("{0}/lua/?.lua;{0}/lua/?/init.lua;{1}", lua_dir, current))?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .eval::<LuaValue>()
}
