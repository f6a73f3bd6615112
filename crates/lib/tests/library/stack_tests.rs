use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use sitestack_lib::execute::{ApplyOptions, apply, destroy};
use sitestack_lib::init::{INDEX_HTML_TEMPLATE, InitOptions, init};
use sitestack_lib::provider::{LocalProvider, ProviderConfig, ProviderError};

struct Deployment {
  temp: TempDir,
  stack_file: PathBuf,
  options: ApplyOptions,
  provider: Arc<LocalProvider>,
}

impl Deployment {
  fn scaffold() -> Self {
    let temp = TempDir::new().unwrap();
    let result = init(&InitOptions {
      dir: temp.path().join("site"),
    })
    .unwrap();
    let options = ApplyOptions {
      state_dir: Some(temp.path().join("state")),
      ..Default::default()
    };
    let provider = Arc::new(LocalProvider::new(
      ProviderConfig::default().with_root(temp.path().join("cloud")),
    ));
    Self {
      stack_file: result.stack_file,
      temp,
      options,
      provider,
    }
  }

  fn edit(&self, from: &str, to: &str) {
    let content = std::fs::read_to_string(&self.stack_file).unwrap();
    assert!(content.contains(from));
    std::fs::write(&self.stack_file, content.replace(from, to)).unwrap();
  }
}

#[tokio::test]
async fn deployed_site_serves_index_and_api_routes_every_path() {
  let d = Deployment::scaffold();
  let result = apply(&d.stack_file, &d.options, d.provider.clone()).await.unwrap();
  assert!(result.is_success(), "{:?}", result.reconcile.failed);

  let served = d.provider.serve_object("site", "/").unwrap();
  assert_eq!(served.key, "index.html");
  assert_eq!(served.content_type, "text/html");
  assert_eq!(served.body, INDEX_HTML_TEMPLATE.as_bytes());

  let api_id = result.reconcile.attributes("gateway").unwrap()["id"].clone();
  for (method, path) in [("GET", "/"), ("POST", "/orders/42"), ("DELETE", "/a/b/c")] {
    let matched = d.provider.route_request(&api_id, method, path).unwrap().unwrap();
    assert_eq!(matched.route_key, "$default");
    assert_eq!(matched.function, "handler");
  }

  let api = result.snapshot.outputs["apiEndpoint"].clone();
  assert_eq!(
    api,
    format!("https://{}.execute-api.us-east-1.amazonaws.com/dev", api_id)
  );
}

#[tokio::test]
async fn stage_without_auto_deploy_serves_no_routes() {
  let d = Deployment::scaffold();
  d.edit("auto_deploy = true,", "auto_deploy = false,");
  let result = apply(&d.stack_file, &d.options, d.provider.clone()).await.unwrap();
  assert!(result.is_success(), "{:?}", result.reconcile.failed);

  let api_id = result.reconcile.attributes("gateway").unwrap()["id"].clone();
  let err = d.provider.route_request(&api_id, "GET", "/anything").unwrap_err();
  assert!(matches!(err, ProviderError::NotFound { .. }), "{err}");

  // Turning it on is an in-place update that exposes the routes.
  d.edit("auto_deploy = false,", "auto_deploy = true,");
  let result = apply(&d.stack_file, &d.options, d.provider.clone()).await.unwrap();
  assert!(result.is_success(), "{:?}", result.reconcile.failed);
  let matched = d.provider.route_request(&api_id, "GET", "/anything").unwrap().unwrap();
  assert_eq!(matched.function, "handler");
}

#[tokio::test]
async fn explicit_policy_matches_public_read_flag() {
  let flagged = Deployment::scaffold();
  apply(&flagged.stack_file, &flagged.options, flagged.provider.clone())
    .await
    .unwrap();

  let explicit = Deployment::scaffold();
  explicit.edit("public_read = true,", "public_read = false,");
  explicit.edit(
    "stack.site_content({",
    "stack.bucket_policy({\n  id = \"site_policy\",\n  bucket = site.name,\n  policy = stack.public_read_policy(site),\n  depends_on = { site },\n})\n\nstack.site_content({",
  );
  let result = apply(&explicit.stack_file, &explicit.options, explicit.provider.clone())
    .await
    .unwrap();
  assert!(result.is_success(), "{:?}", result.reconcile.failed);

  let a = flagged.provider.effective_policy("site").unwrap();
  let b = explicit.provider.effective_policy("site").unwrap();
  for (principal, action, resource) in [
    ("*", "s3:GetObject", "arn:aws:s3:::site/index.html"),
    ("*", "s3:PutObject", "arn:aws:s3:::site/index.html"),
    ("*", "s3:GetObject", "arn:aws:s3:::other/index.html"),
  ] {
    assert_eq!(
      a.allows(principal, action, resource),
      b.allows(principal, action, resource),
      "{action} on {resource}"
    );
  }
  assert!(explicit.provider.serve_object("site", "/index.html").is_ok());
}

#[tokio::test]
async fn destroy_empties_the_cloud() {
  let d = Deployment::scaffold();
  apply(&d.stack_file, &d.options, d.provider.clone()).await.unwrap();

  let result = destroy(&d.options, d.provider.clone()).await.unwrap();
  assert!(result.teardown.is_success(), "{:?}", result.teardown.failed);
  assert_eq!(result.teardown.deleted.len(), 9);
  assert!(d.provider.effective_policy("site").is_err());
  assert!(d.temp.path().join("state").exists());
}
