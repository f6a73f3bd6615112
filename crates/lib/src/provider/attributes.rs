//! Identifiers, attributes and the checks every provider applies.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use super::{DesiredResource, ProviderError};
use crate::resource::{ResourceKind, ResourceSpec};

/// Managed runtimes a function may use.
pub const SUPPORTED_RUNTIMES: &[&str] = &[
  "nodejs14.x",
  "nodejs16.x",
  "nodejs18.x",
  "nodejs20.x",
  "python3.8",
  "python3.9",
  "python3.10",
  "python3.11",
  "python3.12",
  "java11",
  "java17",
  "java21",
  "dotnet6",
  "dotnet8",
  "ruby3.2",
  "go1.x",
  "provided.al2",
  "provided.al2023",
];

/// Stable short identifier for resources whose ids are provider assigned.
pub fn physical_id(region: &str, kind: ResourceKind, name: &str) -> String {
  let digest = hex::encode(Sha256::digest(format!("{}/{}/{}", region, kind, name).as_bytes()));
  digest[..10].to_string()
}

/// Object storage naming rules.
pub fn validate_bucket_name(name: &str) -> Result<(), String> {
  if !(3..=63).contains(&name.len()) {
    return Err("must be between 3 and 63 characters long".to_string());
  }
  if !name
    .chars()
    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
  {
    return Err("may only contain lowercase letters, digits, '-' and '.'".to_string());
  }
  let first_last_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
  if !first_last_ok(name.chars().next()) || !first_last_ok(name.chars().last()) {
    return Err("must begin and end with a letter or digit".to_string());
  }
  if name.contains("..") {
    return Err("must not contain adjacent periods".to_string());
  }
  Ok(())
}

/// Checks that depend only on the desired resource itself.
pub fn validate_desired(desired: &DesiredResource) -> Result<(), ProviderError> {
  match &desired.spec {
    ResourceSpec::StorageBucket(_) => {
      validate_bucket_name(&desired.name).map_err(|reason| ProviderError::InvalidName {
        kind: ResourceKind::StorageBucket,
        name: desired.name.clone(),
        reason,
      })
    }
    ResourceSpec::Function(f) if !SUPPORTED_RUNTIMES.contains(&f.runtime.as_str()) => {
      Err(ProviderError::UnsupportedRuntime {
        function: desired.name.clone(),
        runtime: f.runtime.clone(),
      })
    }
    ResourceSpec::Integration(i) if i.integration_type != "AWS_PROXY" => Err(ProviderError::Rejected {
      kind: ResourceKind::Integration,
      name: desired.name.clone(),
      reason: format!("integration type '{}' is not supported", i.integration_type),
    }),
    _ => Ok(()),
  }
}

fn api_endpoint(region: &str, api_id: &str) -> String {
  format!("https://{}.execute-api.{}.amazonaws.com", api_id, region)
}

fn function_arn(region: &str, account: &str, name: &str) -> String {
  format!("arn:aws:lambda:{}:{}:function:{}", region, account, name)
}

/// Attributes a resource exposes once it exists.
///
/// `id` is the physical id for kinds that have one; it is ignored otherwise.
pub fn attributes(region: &str, account: &str, desired: &DesiredResource, id: &str) -> BTreeMap<String, String> {
  let name = desired.name.as_str();
  let mut attrs = BTreeMap::new();
  let mut set = |k: &str, v: String| {
    attrs.insert(k.to_string(), v);
  };

  match &desired.spec {
    ResourceSpec::StorageBucket(_) => {
      let endpoint = format!("{}.s3-website-{}.amazonaws.com", name, region);
      set("name", name.to_string());
      set("arn", format!("arn:aws:s3:::{}", name));
      set("website_url", format!("http://{}", endpoint));
      set("website_endpoint", endpoint);
      set("domain_name", format!("{}.s3.amazonaws.com", name));
      set("regional_domain_name", format!("{}.s3.{}.amazonaws.com", name, region));
    }
    ResourceSpec::BucketPolicy(p) => set("bucket", p.bucket.clone()),
    ResourceSpec::SiteContent(c) => {
      set("bucket", c.bucket.clone());
      set(
        "etag",
        desired
          .asset_hash
          .as_ref()
          .map(|h| h.0.chars().take(32).collect())
          .unwrap_or_default(),
      );
    }
    ResourceSpec::ExecutionRole(_) => {
      set("name", name.to_string());
      set("arn", format!("arn:aws:iam::{}:role/{}", account, name));
    }
    ResourceSpec::Function(_) => {
      let arn = function_arn(region, account, name);
      set("name", name.to_string());
      set(
        "invoke_arn",
        format!(
          "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{}/invocations",
          region, arn
        ),
      );
      set("arn", arn);
      set(
        "code_sha256",
        desired.asset_hash.as_ref().map(|h| h.0.clone()).unwrap_or_default(),
      );
    }
    ResourceSpec::InvokePermission(_) => set("statement_id", name.to_string()),
    ResourceSpec::Api(_) => {
      set("id", id.to_string());
      set("api_endpoint", api_endpoint(region, id));
      set("execution_arn", format!("arn:aws:execute-api:{}:{}:{}", region, account, id));
    }
    ResourceSpec::Integration(_) => set("id", id.to_string()),
    ResourceSpec::Route(r) => {
      set("id", id.to_string());
      set("route_key", r.route_key.clone());
    }
    ResourceSpec::Stage(s) => {
      let base = api_endpoint(region, &s.api);
      set("id", id.to_string());
      set("name", s.name.clone());
      if s.name == "$default" {
        set("invoke_url", format!("{}/", base));
      } else {
        set("invoke_url", format!("{}/{}", base, s.name));
      }
    }
  }

  attrs
}
