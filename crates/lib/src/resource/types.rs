//! Declared resource types.
//!
//! A [`ResourceDef`] is what a stack file declares: a kind, a logical name,
//! untyped props and explicit dependencies. Props stay untyped in the manifest
//! because string values may still carry attribute references; they are
//! turned into a typed [`ResourceSpec`](super::ResourceSpec) once those
//! references have been resolved.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::placeholder::{self, AttrRef, PlaceholderError, Resolver};

/// The kinds of node a resource graph can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  StorageBucket,
  BucketPolicy,
  SiteContent,
  ExecutionRole,
  Function,
  InvokePermission,
  Api,
  Integration,
  Route,
  Stage,
}

impl ResourceKind {
  pub const ALL: [ResourceKind; 10] = [
    ResourceKind::StorageBucket,
    ResourceKind::BucketPolicy,
    ResourceKind::SiteContent,
    ResourceKind::ExecutionRole,
    ResourceKind::Function,
    ResourceKind::InvokePermission,
    ResourceKind::Api,
    ResourceKind::Integration,
    ResourceKind::Route,
    ResourceKind::Stage,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceKind::StorageBucket => "storage_bucket",
      ResourceKind::BucketPolicy => "bucket_policy",
      ResourceKind::SiteContent => "site_content",
      ResourceKind::ExecutionRole => "execution_role",
      ResourceKind::Function => "function",
      ResourceKind::InvokePermission => "invoke_permission",
      ResourceKind::Api => "api",
      ResourceKind::Integration => "integration",
      ResourceKind::Route => "route",
      ResourceKind::Stage => "stage",
    }
  }

  /// Attributes a live resource of this kind exposes after reconciliation.
  ///
  /// These are the only attributes other declarations may reference.
  pub fn attributes(&self) -> &'static [&'static str] {
    match self {
      ResourceKind::StorageBucket => &[
        "name",
        "arn",
        "website_endpoint",
        "website_url",
        "domain_name",
        "regional_domain_name",
      ],
      ResourceKind::BucketPolicy => &["bucket"],
      ResourceKind::SiteContent => &["bucket", "object_count", "etag"],
      ResourceKind::ExecutionRole => &["name", "arn"],
      ResourceKind::Function => &["name", "arn", "invoke_arn", "code_sha256"],
      ResourceKind::InvokePermission => &["statement_id"],
      ResourceKind::Api => &["id", "api_endpoint", "execution_arn"],
      ResourceKind::Integration => &["id"],
      ResourceKind::Route => &["id", "route_key"],
      ResourceKind::Stage => &["id", "name", "invoke_url"],
    }
  }

  pub fn has_attribute(&self, attr: &str) -> bool {
    self.attributes().contains(&attr)
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ResourceKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ResourceKind::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| format!("unknown resource kind '{}'", s))
  }
}

/// What happens to the live resource when it leaves the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
  /// Delete the live resource.
  #[default]
  Destroy,
  /// Stop managing the resource but leave it in place.
  Retain,
}

/// A declared prop value.
///
/// Untagged so manifests read like the stack file that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Boolean(bool),
  Integer(i64),
  Number(f64),
  String(String),
  Array(Vec<Value>),
  Table(BTreeMap<String, Value>),
}

impl Value {
  /// Visit every string contained in this value.
  fn visit_strings<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
    match self {
      Value::String(s) => f(s),
      Value::Array(items) => items.iter().for_each(|v| v.visit_strings(f)),
      Value::Table(map) => map.values().for_each(|v| v.visit_strings(f)),
      Value::Boolean(_) | Value::Integer(_) | Value::Number(_) => {}
    }
  }

  /// Copy of this value with every placeholder substituted.
  pub fn resolve(&self, resolver: &impl Resolver) -> Result<Value, PlaceholderError> {
    Ok(match self {
      Value::String(s) => Value::String(placeholder::substitute(s, resolver)?),
      Value::Array(items) => Value::Array(items.iter().map(|v| v.resolve(resolver)).collect::<Result<_, _>>()?),
      Value::Table(map) => Value::Table(
        map
          .iter()
          .map(|(k, v)| Ok((k.clone(), v.resolve(resolver)?)))
          .collect::<Result<_, PlaceholderError>>()?,
      ),
      other => other.clone(),
    })
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Boolean(b)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Value::Integer(i)
  }
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
  pub kind: ResourceKind,
  pub name: String,
  #[serde(default)]
  pub props: BTreeMap<String, Value>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub depends_on: BTreeSet<String>,
  #[serde(default)]
  pub removal: RemovalPolicy,
}

impl ResourceDef {
  pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
      props: BTreeMap::new(),
      depends_on: BTreeSet::new(),
      removal: RemovalPolicy::default(),
    }
  }

  /// Builder-style prop setter.
  pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
    self.props.insert(key.to_string(), value.into());
    self
  }

  /// Builder-style explicit dependency.
  pub fn depends_on(mut self, name: &str) -> Self {
    self.depends_on.insert(name.to_string());
    self
  }

  /// All attribute references made by this declaration's props.
  pub fn references(&self) -> Result<Vec<AttrRef>, PlaceholderError> {
    let mut strings = Vec::new();
    for value in self.props.values() {
      value.visit_strings(&mut |s| strings.push(s));
    }

    let mut refs = Vec::new();
    for s in strings {
      refs.extend(placeholder::references(s)?);
    }
    refs.sort();
    refs.dedup();
    Ok(refs)
  }

  /// Props with every reference substituted.
  pub fn resolved_props(&self, resolver: &impl Resolver) -> Result<BTreeMap<String, Value>, PlaceholderError> {
    self
      .props
      .iter()
      .map(|(k, v)| Ok((k.clone(), v.resolve(resolver)?)))
      .collect()
  }
}

/// Logical names are used in placeholders and as physical identifiers.
pub fn validate_name(name: &str) -> Result<(), String> {
  if name.is_empty() {
    return Err("resource name must not be empty".to_string());
  }
  if let Some(c) = name
    .chars()
    .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
  {
    return Err(format!("resource name '{}' contains invalid character '{}'", name, c));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_names_round_trip() {
    for kind in ResourceKind::ALL {
      assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
      let json = serde_json::to_string(&kind).unwrap();
      assert_eq!(json, format!("\"{}\"", kind.as_str()));
    }
    assert!("lambda".parse::<ResourceKind>().is_err());
  }

  #[test]
  fn references_are_collected_from_nested_props() {
    let mut statement = BTreeMap::new();
    statement.insert(
      "Resource".to_string(),
      Value::Array(vec![Value::from("arn:aws:s3:::$${res:site:name}/*")]),
    );
    let def = ResourceDef::new(ResourceKind::BucketPolicy, "policy")
      .prop("bucket", "$${res:site:name}")
      .prop("policy", Value::Table(statement));

    assert_eq!(def.references().unwrap(), vec![AttrRef::new("site", "name")]);
  }

  #[test]
  fn untagged_values_read_naturally() {
    let value: Value = serde_json::from_str(r#"{"memory_size": 128, "ratio": 0.5, "on": true, "tags": ["a"]}"#).unwrap();
    let Value::Table(map) = value else {
      panic!("expected table");
    };
    assert_eq!(map["memory_size"], Value::Integer(128));
    assert_eq!(map["ratio"], Value::Number(0.5));
    assert_eq!(map["on"], Value::Boolean(true));
    assert_eq!(map["tags"], Value::Array(vec![Value::from("a")]));
  }

  #[test]
  fn name_validation() {
    assert!(validate_name("site-bucket_1.v2").is_ok());
    assert!(validate_name("").is_err());
    assert!(validate_name("a:b").is_err());
    assert!(validate_name("has space").is_err());
  }

  #[test]
  fn attributes_are_known_per_kind() {
    assert!(ResourceKind::StorageBucket.has_attribute("website_url"));
    assert!(ResourceKind::Api.has_attribute("api_endpoint"));
    assert!(!ResourceKind::Route.has_attribute("arn"));
  }
}
