//! Conversions between Lua values and declared props.

use std::collections::BTreeMap;

use mlua::prelude::*;

use crate::resource::Value;

/// Metatable `__type` of the tables returned by resource constructors.
pub const RESOURCE_REF_TYPE: &str = "ResourceRef";

/// Logical name of a ResourceRef table, if `table` is one.
pub fn resource_ref_id(table: &LuaTable) -> Option<String> {
  let mt = table.metatable()?;
  match mt.get::<String>("__type") {
    Ok(t) if t == RESOURCE_REF_TYPE => mt.get::<String>("__id").ok(),
    _ => None,
  }
}

/// Convert a Lua value to a prop value. `nil` yields `None`.
///
/// Tables with sequential integer keys starting at 1 become arrays; any other
/// table becomes a map.
pub fn lua_to_value(value: LuaValue, key: &str) -> LuaResult<Option<Value>> {
  let converted = match value {
    LuaValue::Nil => return Ok(None),
    LuaValue::Boolean(b) => Value::Boolean(b),
    LuaValue::Integer(i) => Value::Integer(i),
    LuaValue::Number(n) => Value::Number(n),
    LuaValue::String(s) => Value::String(s.to_str()?.to_string()),
    LuaValue::Table(t) => {
      if let Some(id) = resource_ref_id(&t) {
        return Err(LuaError::external(format!(
          "'{}' was given resource '{}' itself; use one of its attributes, such as {}.arn",
          key, id, id
        )));
      }

      let len = t.raw_len();
      let first: LuaValue = t.raw_get(1)?;
      if len > 0 && first != LuaValue::Nil {
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
          let item: LuaValue = t.raw_get(i)?;
          if let Some(v) = lua_to_value(item, key)? {
            items.push(v);
          }
        }
        Value::Array(items)
      } else {
        let mut map = BTreeMap::new();
        for pair in t.pairs::<String, LuaValue>() {
          let (k, v) = pair?;
          if let Some(v) = lua_to_value(v, &k)? {
            map.insert(k, v);
          }
        }
        Value::Table(map)
      }
    }
    other => {
      return Err(LuaError::external(format!(
        "'{}' has unsupported type {}",
        key,
        other.type_name()
      )));
    }
  };
  Ok(Some(converted))
}

/// Convert JSON to a Lua value.
pub fn json_to_lua(lua: &Lua, value: &serde_json::Value) -> LuaResult<LuaValue> {
  Ok(match value {
    serde_json::Value::Null => LuaValue::Nil,
    serde_json::Value::Bool(b) => LuaValue::Boolean(*b),
    serde_json::Value::Number(n) => match n.as_i64() {
      Some(i) => LuaValue::Integer(i),
      None => LuaValue::Number(n.as_f64().unwrap_or_default()),
    },
    serde_json::Value::String(s) => LuaValue::String(lua.create_string(s)?),
    serde_json::Value::Array(items) => {
      let table = lua.create_table()?;
      for (i, item) in items.iter().enumerate() {
        table.set(i + 1, json_to_lua(lua, item)?)?;
      }
      LuaValue::Table(table)
    }
    serde_json::Value::Object(map) => {
      let table = lua.create_table()?;
      for (k, v) in map {
        table.set(k.as_str(), json_to_lua(lua, v)?)?;
      }
      LuaValue::Table(table)
    }
  })
}
