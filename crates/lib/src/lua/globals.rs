//! The `stack` global table.
//!
//! - `stack.name`, `stack.region`, `stack.dir` - evaluation context
//! - `stack.<kind>{ id = ..., ... }` - declare a resource; `stack.func` is an
//!   alias of `stack["function"]`, whose name is a Lua keyword
//! - `stack.output(name, value)` - declare a named output
//! - `stack.public_read_policy(bucket)` - policy document granting anonymous reads
//!
//! Constructors return a ResourceRef table whose fields are placeholders for
//! every attribute of the kind, e.g. `site.website_endpoint`.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;
use tracing::debug;

use super::convert::{RESOURCE_REF_TYPE, json_to_lua, lua_to_value, resource_ref_id};
use crate::manifest::Manifest;
use crate::placeholder::{self, AttrRef};
use crate::policy::public_read_policy;
use crate::resource::{RemovalPolicy, ResourceDef, ResourceKind, Value};

/// Context exposed to stack files.
#[derive(Debug, Clone)]
pub struct StackContext {
  pub name: String,
  pub region: String,
}

pub fn register_globals(lua: &Lua, manifest: Rc<RefCell<Manifest>>, ctx: &StackContext) -> LuaResult<()> {
  let stack = lua.create_table()?;
  stack.set("name", ctx.name.as_str())?;
  stack.set("region", ctx.region.as_str())?;
  stack.set("dir", ".")?;

  for kind in ResourceKind::ALL {
    let constructor = resource_constructor(lua, kind, manifest.clone())?;
    if kind == ResourceKind::Function {
      stack.set("func", constructor.clone())?;
    }
    stack.set(kind.as_str(), constructor)?;
  }

  let outputs = manifest;
  let output = lua.create_function(move |_, (name, value): (String, LuaValue)| {
    let template = match value {
      LuaValue::String(s) => s.to_str()?.to_string(),
      other => {
        return Err(LuaError::external(format!(
          "output '{}' must be a string, got {}",
          name,
          other.type_name()
        )));
      }
    };
    let mut manifest = outputs.borrow_mut();
    if manifest.outputs.contains_key(&name) {
      return Err(LuaError::external(format!("output '{}' is declared twice", name)));
    }
    manifest.outputs.insert(name, template);
    Ok(())
  })?;
  stack.set("output", output)?;

  let policy = lua.create_function(|lua, bucket: LuaValue| {
    let bucket = match bucket {
      LuaValue::String(s) => s.to_str()?.to_string(),
      LuaValue::Table(t) if resource_ref_id(&t).is_some() => t.get::<String>("name")?,
      other => {
        return Err(LuaError::external(format!(
          "public_read_policy expects a bucket or bucket name, got {}",
          other.type_name()
        )));
      }
    };
    let json = serde_json::to_value(public_read_policy(&bucket)).map_err(LuaError::external)?;
    json_to_lua(lua, &json)
  })?;
  stack.set("public_read_policy", policy)?;

  lua.globals().set("stack", stack)?;
  Ok(())
}

fn resource_constructor(lua: &Lua, kind: ResourceKind, manifest: Rc<RefCell<Manifest>>) -> LuaResult<LuaFunction> {
  lua.create_function(move |lua, spec: LuaTable| {
    let id: String = spec
      .get::<Option<String>>("id")?
      .ok_or_else(|| LuaError::external(format!("{} requires an 'id' field", kind)))?;

    let mut def = ResourceDef::new(kind, id.clone());
    for pair in spec.pairs::<String, LuaValue>() {
      let (key, value) = pair?;
      match key.as_str() {
        "id" => {}
        "depends_on" => def.depends_on = parse_depends_on(value)?,
        "removal" => def.removal = parse_removal(value)?,
        _ => {
          if let Some(v) = lua_to_value(value, &key)? {
            def.props.insert(key, v);
          }
        }
      }
    }

    resolve_asset_path(lua, &mut def)?;

    {
      let mut manifest = manifest.borrow_mut();
      if manifest.resources.contains_key(&id) {
        return Err(LuaError::external(format!("resource '{}' is declared twice", id)));
      }
      debug!(resource = %id, %kind, "declared resource");
      manifest.resources.insert(id.clone(), def);
    }

    resource_ref(lua, kind, &id)
  })
}

/// `depends_on` takes a ref, a name, or a list of either.
fn parse_depends_on(value: LuaValue) -> LuaResult<BTreeSet<String>> {
  let single = |value: LuaValue| -> LuaResult<String> {
    match value {
      LuaValue::String(s) => Ok(s.to_str()?.to_string()),
      LuaValue::Table(t) => {
        resource_ref_id(&t).ok_or_else(|| LuaError::external("depends_on entries must be resources or names"))
      }
      other => Err(LuaError::external(format!(
        "depends_on entries must be resources or names, got {}",
        other.type_name()
      ))),
    }
  };

  match value {
    LuaValue::Table(t) if resource_ref_id(&t).is_none() => {
      let mut deps = BTreeSet::new();
      for item in t.sequence_values::<LuaValue>() {
        deps.insert(single(item?)?);
      }
      Ok(deps)
    }
    other => Ok(BTreeSet::from([single(other)?])),
  }
}

fn parse_removal(value: LuaValue) -> LuaResult<RemovalPolicy> {
  match value {
    LuaValue::String(s) => match &*s.to_str()? {
      "destroy" => Ok(RemovalPolicy::Destroy),
      "retain" => Ok(RemovalPolicy::Retain),
      other => Err(LuaError::external(format!(
        "removal must be 'destroy' or 'retain', got '{}'",
        other
      ))),
    },
    other => Err(LuaError::external(format!(
      "removal must be a string, got {}",
      other.type_name()
    ))),
  }
}

/// Make relative asset paths absolute against the stack file's directory.
fn resolve_asset_path(lua: &Lua, def: &mut ResourceDef) -> LuaResult<()> {
  let key = match def.kind {
    ResourceKind::SiteContent => "source",
    ResourceKind::Function => "code",
    _ => return Ok(()),
  };
  let Some(Value::String(path)) = def.props.get_mut(key) else {
    return Ok(());
  };
  if placeholder::has_references(path) || Path::new(path.as_str()).is_absolute() {
    return Ok(());
  }

  let dir: String = lua.globals().get::<LuaTable>("stack")?.get("dir")?;
  let joined = Path::new(&dir).join(path.trim_start_matches("./"));
  *path = joined.to_string_lossy().into_owned();
  Ok(())
}

fn resource_ref(lua: &Lua, kind: ResourceKind, id: &str) -> LuaResult<LuaTable> {
  let table = lua.create_table()?;
  for attr in kind.attributes() {
    table.set(*attr, AttrRef::new(id, *attr).to_placeholder())?;
  }

  let mt = lua.create_table()?;
  mt.set("__type", RESOURCE_REF_TYPE)?;
  mt.set("__id", id)?;
  mt.set("__kind", kind.as_str())?;
  table.set_metatable(Some(mt))?;
  Ok(table)
}
