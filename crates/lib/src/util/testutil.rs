//! Test fixtures for sitestack-lib.
//!
//! Builds the canonical website + function stack and the asset directories it
//! points at, so graph, reconcile and output tests all exercise the same
//! declarations.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::manifest::Manifest;
use crate::resource::{ResourceDef, ResourceKind, Value};

pub const HANDLER_JS: &str = "exports.handler = async (event) => ({ statusCode: 200, body: 'hello' });\n";

/// Build a resource from JSON props and explicit dependencies.
pub fn def(kind: ResourceKind, name: &str, props: serde_json::Value, deps: &[&str]) -> ResourceDef {
  let mut def = ResourceDef::new(kind, name);
  if let Value::Table(map) = serde_json::from_value(props).unwrap() {
    def.props = map;
  }
  def.depends_on = deps.iter().map(|d| d.to_string()).collect();
  def
}

/// Write a website directory and a function code directory under `root`.
pub fn write_assets(root: &Path) -> (PathBuf, PathBuf) {
  let site = root.join("website");
  let code = root.join("function");
  fs::create_dir_all(site.join("css")).unwrap();
  fs::create_dir_all(&code).unwrap();
  fs::write(site.join("index.html"), "<h1>hello</h1>").unwrap();
  fs::write(site.join("css/app.css"), "h1 { color: red }").unwrap();
  fs::write(code.join("index.js"), HANDLER_JS).unwrap();
  (site, code)
}

/// The website + function stack, with the given function runtime.
pub fn website_stack(site: &Path, code: &Path, runtime: &str) -> Manifest {
  Manifest::new("dev")
    .with_resource(def(
      ResourceKind::StorageBucket,
      "site",
      json!({ "public_read": true, "index_document": "index.html" }),
      &[],
    ))
    .with_resource(def(
      ResourceKind::SiteContent,
      "site_content",
      json!({ "bucket": "$${res:site:name}", "source": site.to_string_lossy() }),
      &["site"],
    ))
    .with_resource(def(
      ResourceKind::ExecutionRole,
      "role",
      json!({
        "assume_role_policy": {
          "Version": "2012-10-17",
          "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": "lambda.amazonaws.com" },
            "Action": "sts:AssumeRole"
          }]
        },
        "managed_policy_arns": ["arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"]
      }),
      &[],
    ))
    .with_resource(def(
      ResourceKind::Function,
      "handler",
      json!({
        "runtime": runtime,
        "handler": "index.handler",
        "code": code.to_string_lossy(),
        "role": "$${res:role:arn}"
      }),
      &["role"],
    ))
    .with_resource(def(ResourceKind::Api, "gateway", json!({ "protocol": "HTTP" }), &[]))
    .with_resource(def(
      ResourceKind::InvokePermission,
      "invoke",
      json!({
        "function": "$${res:handler:name}",
        "principal": "apigateway.amazonaws.com",
        "source_arn": "$${res:gateway:execution_arn}/*/*"
      }),
      &["handler", "gateway"],
    ))
    .with_resource(def(
      ResourceKind::Integration,
      "integration",
      json!({ "api": "$${res:gateway:id}", "integration_uri": "$${res:handler:arn}" }),
      &["gateway", "handler"],
    ))
    .with_resource(def(
      ResourceKind::Route,
      "route",
      json!({
        "api": "$${res:gateway:id}",
        "route_key": "$default",
        "target": "integrations/$${res:integration:id}"
      }),
      &["gateway", "integration"],
    ))
    .with_resource(def(
      ResourceKind::Stage,
      "stage",
      json!({ "api": "$${res:gateway:id}", "name": "dev", "auto_deploy": true }),
      &["gateway", "route"],
    ))
    .with_output("websiteEndpoint", "http://$${res:site:website_endpoint}/")
    .with_output("apiEndpoint", "$${res:stage:invoke_url}")
}

/// The website + function stack pointing at assets that need not exist.
pub fn sample_stack() -> Manifest {
  website_stack(Path::new("/assets/website"), Path::new("/assets/function"), "nodejs16.x")
}
