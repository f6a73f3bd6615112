//! Typed per-kind resource specs.
//!
//! Specs are produced from resolved props. Unknown fields are rejected so that
//! a misspelt prop fails validation instead of being silently ignored.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::types::{ResourceKind, Value};
use crate::policy::PolicyDocument;

/// Static website hosting bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketSpec {
  #[serde(default)]
  pub public_read: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub index_document: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_document: Option<String>,
  #[serde(default = "default_true")]
  pub auto_delete_objects: bool,
}

/// Explicit access policy attached to a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketPolicySpec {
  pub bucket: String,
  pub policy: PolicyDocument,
}

/// Files uploaded into a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteContentSpec {
  pub bucket: String,
  /// Directory or single file, absolute after evaluation.
  pub source: String,
  /// Key prefix for every uploaded object.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub prefix: Option<String>,
  /// Object key when `source` is a single file. Defaults to its file name.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
  /// Forces one content type for every object.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_type: Option<String>,
  /// Remove objects under the prefix that are no longer part of the asset.
  #[serde(default = "default_true")]
  pub prune: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
  pub assume_role_policy: PolicyDocument,
  #[serde(default, deserialize_with = "lenient_vec")]
  pub managed_policy_arns: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
  pub runtime: String,
  /// `<module>.<export>`, e.g. `index.handler`.
  pub handler: String,
  /// Code directory, absolute after evaluation.
  pub code: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
  #[serde(default = "default_memory_size")]
  pub memory_size: u32,
  #[serde(default = "default_timeout")]
  pub timeout: u32,
  #[serde(default, deserialize_with = "lenient_map")]
  pub environment: BTreeMap<String, String>,
}

impl FunctionSpec {
  /// Split the handler into module and export names.
  pub fn handler_parts(&self) -> Option<(&str, &str)> {
    let (module, export) = self.handler.rsplit_once('.')?;
    if module.is_empty() || export.is_empty() {
      return None;
    }
    Some((module, export))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionSpec {
  /// Function name or ARN.
  pub function: String,
  #[serde(default = "default_invoke_action")]
  pub action: String,
  pub principal: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_arn: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiProtocol {
  #[default]
  #[serde(rename = "HTTP")]
  Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSpec {
  #[serde(default)]
  pub protocol: ApiProtocol,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationSpec {
  /// Api id.
  pub api: String,
  #[serde(default = "default_integration_type")]
  pub integration_type: String,
  /// Function ARN the integration proxies to.
  pub integration_uri: String,
  #[serde(default = "default_integration_method")]
  pub integration_method: String,
  #[serde(default = "default_payload_format")]
  pub payload_format_version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub passthrough_behavior: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
  pub api: String,
  #[serde(default = "default_route_key")]
  pub route_key: String,
  /// `integrations/<integration-id>`.
  pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSettings {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub throttling_burst_limit: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub throttling_rate_limit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
  pub api: String,
  #[serde(default = "default_stage_name")]
  pub name: String,
  #[serde(default = "default_true")]
  pub auto_deploy: bool,
  #[serde(default, deserialize_with = "lenient_map")]
  pub route_settings: BTreeMap<String, RouteSettings>,
}

/// Typed spec of any resource kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResourceSpec {
  StorageBucket(BucketSpec),
  BucketPolicy(BucketPolicySpec),
  SiteContent(SiteContentSpec),
  ExecutionRole(RoleSpec),
  Function(FunctionSpec),
  InvokePermission(PermissionSpec),
  Api(ApiSpec),
  Integration(IntegrationSpec),
  Route(RouteSpec),
  Stage(StageSpec),
}

impl ResourceSpec {
  /// Deserialize props into the spec for `kind`.
  pub fn from_props(kind: ResourceKind, props: &BTreeMap<String, Value>) -> Result<Self, serde_json::Error> {
    let json = serde_json::to_value(props)?;
    Ok(match kind {
      ResourceKind::StorageBucket => ResourceSpec::StorageBucket(serde_json::from_value(json)?),
      ResourceKind::BucketPolicy => ResourceSpec::BucketPolicy(serde_json::from_value(json)?),
      ResourceKind::SiteContent => ResourceSpec::SiteContent(serde_json::from_value(json)?),
      ResourceKind::ExecutionRole => ResourceSpec::ExecutionRole(serde_json::from_value(json)?),
      ResourceKind::Function => ResourceSpec::Function(serde_json::from_value(json)?),
      ResourceKind::InvokePermission => ResourceSpec::InvokePermission(serde_json::from_value(json)?),
      ResourceKind::Api => ResourceSpec::Api(serde_json::from_value(json)?),
      ResourceKind::Integration => ResourceSpec::Integration(serde_json::from_value(json)?),
      ResourceKind::Route => ResourceSpec::Route(serde_json::from_value(json)?),
      ResourceKind::Stage => ResourceSpec::Stage(serde_json::from_value(json)?),
    })
  }

  pub fn kind(&self) -> ResourceKind {
    match self {
      ResourceSpec::StorageBucket(_) => ResourceKind::StorageBucket,
      ResourceSpec::BucketPolicy(_) => ResourceKind::BucketPolicy,
      ResourceSpec::SiteContent(_) => ResourceKind::SiteContent,
      ResourceSpec::ExecutionRole(_) => ResourceKind::ExecutionRole,
      ResourceSpec::Function(_) => ResourceKind::Function,
      ResourceSpec::InvokePermission(_) => ResourceKind::InvokePermission,
      ResourceSpec::Api(_) => ResourceKind::Api,
      ResourceSpec::Integration(_) => ResourceKind::Integration,
      ResourceSpec::Route(_) => ResourceKind::Route,
      ResourceSpec::Stage(_) => ResourceKind::Stage,
    }
  }

  /// JSON form, as stored in live records.
  pub fn to_json(&self) -> serde_json::Value {
    // Specs only hold strings, numbers, bools, maps and lists.
    serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
  }
}

fn default_true() -> bool {
  true
}

fn default_memory_size() -> u32 {
  128
}

fn default_timeout() -> u32 {
  3
}

fn default_invoke_action() -> String {
  "lambda:InvokeFunction".to_string()
}

fn default_integration_type() -> String {
  "AWS_PROXY".to_string()
}

fn default_integration_method() -> String {
  "POST".to_string()
}

fn default_payload_format() -> String {
  "2.0".to_string()
}

fn default_route_key() -> String {
  "$default".to_string()
}

fn default_stage_name() -> String {
  "$default".to_string()
}

// An empty Lua table cannot tell a list from a map, so accept `{}` for both.

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  match serde_json::Value::deserialize(deserializer)? {
    serde_json::Value::Object(map) if map.is_empty() => Ok(Vec::new()),
    other => serde_json::from_value(other).map_err(serde::de::Error::custom),
  }
}

fn lenient_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  match serde_json::Value::deserialize(deserializer)? {
    serde_json::Value::Array(items) if items.is_empty() => Ok(BTreeMap::new()),
    other => serde_json::from_value(other).map_err(serde::de::Error::custom),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn props(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
  }

  #[test]
  fn function_defaults_apply() {
    let spec = ResourceSpec::from_props(
      ResourceKind::Function,
      &props(&[
        ("runtime", "nodejs16.x".into()),
        ("handler", "index.handler".into()),
        ("code", "/app/function".into()),
      ]),
    )
    .unwrap();

    let ResourceSpec::Function(f) = spec else {
      panic!("expected function spec");
    };
    assert_eq!(f.memory_size, 128);
    assert_eq!(f.timeout, 3);
    assert!(f.environment.is_empty());
    assert_eq!(f.handler_parts(), Some(("index", "handler")));
  }

  #[test]
  fn missing_required_field_is_rejected() {
    let err = ResourceSpec::from_props(ResourceKind::Function, &props(&[("runtime", "nodejs16.x".into())]));
    assert!(err.is_err());
  }

  #[test]
  fn unknown_field_is_rejected() {
    let err = ResourceSpec::from_props(ResourceKind::StorageBucket, &props(&[("publik_read", true.into())]));
    assert!(err.unwrap_err().to_string().contains("publik_read"));
  }

  #[test]
  fn gateway_defaults_match_http_proxy() {
    let spec = ResourceSpec::from_props(
      ResourceKind::Integration,
      &props(&[("api", "abc".into()), ("integration_uri", "arn:fn".into())]),
    )
    .unwrap();
    let ResourceSpec::Integration(i) = spec else {
      panic!("expected integration spec");
    };
    assert_eq!(i.integration_type, "AWS_PROXY");
    assert_eq!(i.payload_format_version, "2.0");

    let route = ResourceSpec::from_props(
      ResourceKind::Route,
      &props(&[("api", "abc".into()), ("target", "integrations/x".into())]),
    )
    .unwrap();
    let ResourceSpec::Route(r) = route else {
      panic!("expected route spec");
    };
    assert_eq!(r.route_key, "$default");
  }

  #[test]
  fn only_http_protocol_is_accepted() {
    assert!(ResourceSpec::from_props(ResourceKind::Api, &props(&[("protocol", "HTTP".into())])).is_ok());
    assert!(ResourceSpec::from_props(ResourceKind::Api, &props(&[("protocol", "REST".into())])).is_err());
  }

  #[test]
  fn empty_table_is_accepted_for_lists_and_maps() {
    let spec = ResourceSpec::from_props(
      ResourceKind::Function,
      &props(&[
        ("runtime", "nodejs16.x".into()),
        ("handler", "index.handler".into()),
        ("code", "/app/function".into()),
        ("environment", Value::Array(vec![])),
      ]),
    );
    assert!(spec.is_ok());

    let mut policy = BTreeMap::new();
    policy.insert(
      "Statement".to_string(),
      Value::Array(vec![Value::Table(props(&[
        ("Effect", "Allow".into()),
        ("Action", "sts:AssumeRole".into()),
      ]))]),
    );
    let role = ResourceSpec::from_props(
      ResourceKind::ExecutionRole,
      &props(&[
        ("assume_role_policy", Value::Table(policy)),
        ("managed_policy_arns", Value::Table(BTreeMap::new())),
      ]),
    );
    assert!(role.is_ok());
  }
}
