//! Files written by `sitestack init`.

/// Stack file declaring the website + function stack.
pub const STACK_LUA_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/stack.lua"));

pub const INDEX_HTML_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/index.html"));

pub const HANDLER_JS_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/index.js"));

/// LuaLS configuration so editors know about the `stack` global.
pub const LUARC_JSON_TEMPLATE: &str = r#"{
  "$schema": "https://raw.githubusercontent.com/LuaLS/vscode-lua/master/setting/schema.json",
  "runtime": {
    "version": "Lua 5.4"
  },
  "diagnostics": {
    "globals": ["stack"]
  }
}
"#;
