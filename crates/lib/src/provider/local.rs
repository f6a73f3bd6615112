//! Filesystem-backed emulated cloud.
//!
//! # Layout
//!
//! ```text
//! {root}/{region}/
//! ├── resources/<kind>/<name>.json    # LiveResource records
//! ├── buckets/<bucket>/index.json     # object metadata
//! ├── buckets/<bucket>/objects/<key>  # object bodies
//! └── functions/<name>/code/          # deployed function code
//! ```
//!
//! Work happens on the blocking pool; records are written atomically (temp
//! file, then rename).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{
  DesiredResource, LiveResource, Provider, ProviderConfig, ProviderError, RouteMatch, attributes, physical_id,
  route_matches, validate_desired,
};
use crate::asset::site_objects;
use crate::policy::{EffectivePolicy, PolicyDocument};
use crate::resource::{BucketSpec, ResourceKind, ResourceSpec, SiteContentSpec};

const INDEX_FILENAME: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ObjectMeta {
  content_type: String,
  size: u64,
  /// Site content resource that uploaded the object.
  owner: String,
}

/// An object served from a public bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedObject {
  pub key: String,
  pub content_type: String,
  pub body: Vec<u8>,
}

/// Provider backed by a directory tree.
#[derive(Debug, Clone)]
pub struct LocalProvider {
  cloud: Arc<LocalCloud>,
}

#[derive(Debug)]
struct LocalCloud {
  root: PathBuf,
  region: String,
  account_id: String,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ProviderError + '_ {
  move |e| ProviderError::Io {
    path: path.to_path_buf(),
    message: e.to_string(),
  }
}

async fn blocking<T, F>(f: F) -> Result<T, ProviderError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| ProviderError::Task(e.to_string()))?
}

impl LocalProvider {
  pub fn new(config: ProviderConfig) -> Self {
    Self {
      cloud: Arc::new(LocalCloud {
        root: config.root.join(&config.region),
        region: config.region,
        account_id: config.account_id,
      }),
    }
  }

  /// Directory holding this region's state.
  pub fn root(&self) -> &Path {
    &self.cloud.root
  }

  pub fn region(&self) -> &str {
    &self.cloud.region
  }

  /// Access policy currently governing a bucket.
  pub fn effective_policy(&self, bucket: &str) -> Result<EffectivePolicy, ProviderError> {
    self.cloud.effective_policy(bucket)
  }

  /// Keys of every object stored in a bucket.
  pub fn object_keys(&self, bucket: &str) -> Result<Vec<String>, ProviderError> {
    Ok(self.cloud.load_index(bucket)?.into_keys().collect())
  }

  /// Serve `path` from a bucket the way its website endpoint would, as an
  /// anonymous reader.
  pub fn serve_object(&self, bucket: &str, path: &str) -> Result<ServedObject, ProviderError> {
    self.cloud.serve_object(bucket, path)
  }

  /// Resolve which function a request to an api would invoke.
  ///
  /// `path` is relative to the stage. Returns `None` when no route matches and
  /// `NotFound` when the api has no stage with `auto_deploy` on.
  pub fn route_request(&self, api_id: &str, method: &str, path: &str) -> Result<Option<RouteMatch>, ProviderError> {
    self.cloud.route_request(api_id, method, path)
  }
}

impl Provider for LocalProvider {
  async fn read(&self, kind: ResourceKind, name: &str) -> Result<Option<LiveResource>, ProviderError> {
    let cloud = self.cloud.clone();
    let name = name.to_string();
    blocking(move || cloud.read_record(kind, &name)).await
  }

  async fn create(&self, desired: &DesiredResource) -> Result<LiveResource, ProviderError> {
    let cloud = self.cloud.clone();
    let desired = desired.clone();
    blocking(move || cloud.put(&desired, None)).await
  }

  async fn update(&self, desired: &DesiredResource, current: &LiveResource) -> Result<LiveResource, ProviderError> {
    let cloud = self.cloud.clone();
    let desired = desired.clone();
    let current = current.clone();
    blocking(move || cloud.put(&desired, Some(&current))).await
  }

  async fn delete(&self, current: &LiveResource) -> Result<(), ProviderError> {
    let cloud = self.cloud.clone();
    let current = current.clone();
    blocking(move || cloud.remove(&current)).await
  }
}

impl LocalCloud {
  fn record_path(&self, kind: ResourceKind, name: &str) -> PathBuf {
    self.root.join("resources").join(kind.as_str()).join(format!("{}.json", name))
  }

  fn bucket_dir(&self, bucket: &str) -> PathBuf {
    self.root.join("buckets").join(bucket)
  }

  fn function_dir(&self, name: &str) -> PathBuf {
    self.root.join("functions").join(name)
  }

  fn read_record(&self, kind: ResourceKind, name: &str) -> Result<Option<LiveResource>, ProviderError> {
    let path = self.record_path(kind, name);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(io_err(&path)(e)),
    };
    serde_json::from_str(&content).map(Some).map_err(|e| ProviderError::Corrupt {
      path,
      message: e.to_string(),
    })
  }

  fn write_record(&self, record: &LiveResource) -> Result<(), ProviderError> {
    let path = self.record_path(record.kind, &record.name);
    let content = serde_json::to_string_pretty(record).map_err(|e| ProviderError::Corrupt {
      path: path.clone(),
      message: e.to_string(),
    })?;
    write_atomic(&path, content.as_bytes())
  }

  fn remove_record(&self, kind: ResourceKind, name: &str) -> Result<(), ProviderError> {
    let path = self.record_path(kind, name);
    match fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(io_err(&path)(e)),
    }
  }

  fn list_records(&self, kind: ResourceKind) -> Result<Vec<LiveResource>, ProviderError> {
    let dir = self.root.join("resources").join(kind.as_str());
    let entries = match fs::read_dir(&dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(io_err(&dir)(e)),
    };

    let mut names: Vec<String> = entries
      .filter_map(Result::ok)
      .filter_map(|e| {
        let path = e.path();
        (path.extension()? == "json").then(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))?
      })
      .collect();
    names.sort();

    let mut records = Vec::new();
    for name in names {
      if let Some(record) = self.read_record(kind, &name)? {
        records.push(record);
      }
    }
    Ok(records)
  }

  fn find_by_attribute(
    &self,
    kind: ResourceKind,
    attr: &str,
    value: &str,
  ) -> Result<Option<LiveResource>, ProviderError> {
    Ok(
      self
        .list_records(kind)?
        .into_iter()
        .find(|r| r.attribute(attr) == Some(value)),
    )
  }

  fn require(&self, found: Option<LiveResource>, resource: &str, reference: &str) -> Result<LiveResource, ProviderError> {
    found.ok_or_else(|| ProviderError::DanglingReference {
      resource: resource.to_string(),
      reference: reference.to_string(),
    })
  }

  /// Every resource another resource points at must already exist.
  fn check_references(&self, desired: &DesiredResource) -> Result<(), ProviderError> {
    let name = desired.name.as_str();
    match &desired.spec {
      ResourceSpec::BucketPolicy(p) => {
        self.require(self.read_record(ResourceKind::StorageBucket, &p.bucket)?, name, &p.bucket)?;
      }
      ResourceSpec::SiteContent(c) => {
        self.require(self.read_record(ResourceKind::StorageBucket, &c.bucket)?, name, &c.bucket)?;
      }
      ResourceSpec::Function(f) => {
        if let Some(role) = &f.role {
          self.require(self.find_by_attribute(ResourceKind::ExecutionRole, "arn", role)?, name, role)?;
        }
      }
      ResourceSpec::InvokePermission(p) => {
        let by_name = self.read_record(ResourceKind::Function, &p.function)?;
        let found = match by_name {
          Some(f) => Some(f),
          None => self.find_by_attribute(ResourceKind::Function, "arn", &p.function)?,
        };
        self.require(found, name, &p.function)?;
      }
      ResourceSpec::Integration(i) => {
        self.require(self.find_by_attribute(ResourceKind::Api, "id", &i.api)?, name, &i.api)?;
        self.require(self.function_for_uri(&i.integration_uri)?, name, &i.integration_uri)?;
      }
      ResourceSpec::Route(r) => {
        self.require(self.find_by_attribute(ResourceKind::Api, "id", &r.api)?, name, &r.api)?;
        let integration_id = r.target.strip_prefix("integrations/").ok_or_else(|| ProviderError::Rejected {
          kind: ResourceKind::Route,
          name: name.to_string(),
          reason: format!("target '{}' is not of the form integrations/<id>", r.target),
        })?;
        let integration = self.require(
          self.find_by_attribute(ResourceKind::Integration, "id", integration_id)?,
          name,
          &r.target,
        )?;
        if integration.spec.get("api").and_then(|v| v.as_str()) != Some(r.api.as_str()) {
          return Err(ProviderError::Rejected {
            kind: ResourceKind::Route,
            name: name.to_string(),
            reason: format!("integration '{}' belongs to another api", integration_id),
          });
        }
      }
      ResourceSpec::Stage(s) => {
        self.require(self.find_by_attribute(ResourceKind::Api, "id", &s.api)?, name, &s.api)?;
      }
      ResourceSpec::StorageBucket(_) | ResourceSpec::ExecutionRole(_) | ResourceSpec::Api(_) => {}
    }
    Ok(())
  }

  fn function_for_uri(&self, uri: &str) -> Result<Option<LiveResource>, ProviderError> {
    Ok(
      self
        .list_records(ResourceKind::Function)?
        .into_iter()
        .find(|f| f.attribute("arn") == Some(uri) || f.attribute("invoke_arn") == Some(uri)),
    )
  }

  /// Create or update.
  fn put(&self, desired: &DesiredResource, current: Option<&LiveResource>) -> Result<LiveResource, ProviderError> {
    validate_desired(desired)?;
    self.check_references(desired)?;

    let kind = desired.kind();
    let id = current
      .and_then(|c| c.attribute("id"))
      .map(str::to_string)
      .unwrap_or_else(|| physical_id(&self.region, kind, &desired.name));
    let mut attrs = attributes(&self.region, &self.account_id, desired, &id);

    match &desired.spec {
      ResourceSpec::StorageBucket(_) => {
        let dir = self.bucket_dir(&desired.name).join("objects");
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
      }
      ResourceSpec::SiteContent(content) => {
        if let Some(previous) = current.and_then(|c| c.spec.get("bucket")).and_then(|b| b.as_str())
          && previous != content.bucket
        {
          self.remove_owned_objects(previous, &desired.name)?;
        }
        let count = self.upload(&desired.name, content)?;
        attrs.insert("object_count".to_string(), count.to_string());
      }
      ResourceSpec::Function(function) => {
        let code = self.function_dir(&desired.name).join("code");
        if code.exists() {
          fs::remove_dir_all(&code).map_err(io_err(&code))?;
        }
        copy_dir(Path::new(&function.code), &code)?;
      }
      _ => {}
    }

    let record = LiveResource {
      kind,
      name: desired.name.clone(),
      spec: desired.spec.to_json(),
      asset_hash: desired.asset_hash.clone(),
      attributes: attrs,
    };
    self.write_record(&record)?;
    info!(kind = %kind, resource = %desired.name, region = %self.region, "stored live resource");
    Ok(record)
  }

  fn remove(&self, current: &LiveResource) -> Result<(), ProviderError> {
    match current.kind {
      ResourceKind::StorageBucket => {
        let spec: BucketSpec = serde_json::from_value(current.spec.clone()).map_err(|e| ProviderError::Corrupt {
          path: self.record_path(current.kind, &current.name),
          message: e.to_string(),
        })?;
        let objects = self.load_index(&current.name)?.len();
        if objects > 0 && !spec.auto_delete_objects {
          return Err(ProviderError::BucketNotEmpty {
            bucket: current.name.clone(),
            objects,
          });
        }
        let dir = self.bucket_dir(&current.name);
        if dir.exists() {
          fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
      }
      ResourceKind::SiteContent => {
        if let Some(bucket) = current.spec.get("bucket").and_then(|b| b.as_str()) {
          self.remove_owned_objects(bucket, &current.name)?;
        }
      }
      ResourceKind::Function => {
        let dir = self.function_dir(&current.name);
        if dir.exists() {
          fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
      }
      _ => {}
    }

    self.remove_record(current.kind, &current.name)?;
    info!(kind = %current.kind, resource = %current.name, "removed live resource");
    Ok(())
  }

  fn load_index(&self, bucket: &str) -> Result<BTreeMap<String, ObjectMeta>, ProviderError> {
    let path = self.bucket_dir(bucket).join(INDEX_FILENAME);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
      Err(e) => return Err(io_err(&path)(e)),
    };
    serde_json::from_str(&content).map_err(|e| ProviderError::Corrupt {
      path,
      message: e.to_string(),
    })
  }

  fn save_index(&self, bucket: &str, index: &BTreeMap<String, ObjectMeta>) -> Result<(), ProviderError> {
    let path = self.bucket_dir(bucket).join(INDEX_FILENAME);
    let content = serde_json::to_string_pretty(index).map_err(|e| ProviderError::Corrupt {
      path: path.clone(),
      message: e.to_string(),
    })?;
    write_atomic(&path, content.as_bytes())
  }

  fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
    self.bucket_dir(bucket).join("objects").join(key)
  }

  /// Upload every object of a site content declaration. Returns the count.
  fn upload(&self, owner: &str, content: &SiteContentSpec) -> Result<usize, ProviderError> {
    let objects = site_objects(owner, content).map_err(|e| ProviderError::Io {
      path: PathBuf::from(&content.source),
      message: e.to_string(),
    })?;

    let mut index = self.load_index(&content.bucket)?;
    for object in &objects {
      let target = self.object_path(&content.bucket, &object.key);
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
      }
      let size = fs::copy(&object.path, &target).map_err(io_err(&object.path))?;
      index.insert(
        object.key.clone(),
        ObjectMeta {
          content_type: object.content_type.clone(),
          size,
          owner: owner.to_string(),
        },
      );
    }

    if content.prune {
      let keep: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
      let stale: Vec<String> = index
        .iter()
        .filter(|(key, meta)| meta.owner == owner && !keep.contains(&key.as_str()))
        .map(|(key, _)| key.clone())
        .collect();
      for key in stale {
        debug!(bucket = %content.bucket, key = %key, "pruning object");
        self.remove_object(&content.bucket, &key)?;
        index.remove(&key);
      }
    }

    self.save_index(&content.bucket, &index)?;
    Ok(objects.len())
  }

  fn remove_object(&self, bucket: &str, key: &str) -> Result<(), ProviderError> {
    let path = self.object_path(bucket, key);
    match fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(io_err(&path)(e)),
    }
  }

  fn remove_owned_objects(&self, bucket: &str, owner: &str) -> Result<(), ProviderError> {
    if !self.bucket_dir(bucket).exists() {
      return Ok(());
    }
    let mut index = self.load_index(bucket)?;
    let owned: Vec<String> = index
      .iter()
      .filter(|(_, meta)| meta.owner == owner)
      .map(|(key, _)| key.clone())
      .collect();
    for key in owned {
      self.remove_object(bucket, &key)?;
      index.remove(&key);
    }
    self.save_index(bucket, &index)
  }

  fn effective_policy(&self, bucket: &str) -> Result<EffectivePolicy, ProviderError> {
    let record = self
      .read_record(ResourceKind::StorageBucket, bucket)?
      .ok_or_else(|| ProviderError::NotFound {
        kind: ResourceKind::StorageBucket,
        name: bucket.to_string(),
      })?;
    let public_read = record.spec.get("public_read").and_then(|v| v.as_bool()).unwrap_or(false);

    let mut attached = Vec::new();
    for policy in self.list_records(ResourceKind::BucketPolicy)? {
      if policy.spec.get("bucket").and_then(|v| v.as_str()) != Some(bucket) {
        continue;
      }
      if let Some(doc) = policy.spec.get("policy") {
        let doc: PolicyDocument = serde_json::from_value(doc.clone()).map_err(|e| ProviderError::Corrupt {
          path: self.record_path(ResourceKind::BucketPolicy, &policy.name),
          message: e.to_string(),
        })?;
        attached.push(doc);
      }
    }

    Ok(EffectivePolicy::for_bucket(bucket, public_read, &attached))
  }

  fn serve_object(&self, bucket: &str, path: &str) -> Result<ServedObject, ProviderError> {
    let record = self
      .read_record(ResourceKind::StorageBucket, bucket)?
      .ok_or_else(|| ProviderError::NotFound {
        kind: ResourceKind::StorageBucket,
        name: bucket.to_string(),
      })?;

    let mut key = path.trim_start_matches('/').to_string();
    if key.is_empty() || key.ends_with('/') {
      let index_document = record
        .spec
        .get("index_document")
        .and_then(|v| v.as_str())
        .unwrap_or("index.html");
      key.push_str(index_document);
    }

    let arn = format!("arn:aws:s3:::{}/{}", bucket, key);
    if !self.effective_policy(bucket)?.allows("*", "s3:GetObject", &arn) {
      return Err(ProviderError::AccessDenied(format!("anonymous read of {}", arn)));
    }

    let index = self.load_index(bucket)?;
    let meta = index.get(&key).ok_or_else(|| ProviderError::NotFound {
      kind: ResourceKind::SiteContent,
      name: format!("{}/{}", bucket, key),
    })?;
    let object_path = self.object_path(bucket, &key);
    let body = fs::read(&object_path).map_err(io_err(&object_path))?;

    Ok(ServedObject {
      key,
      content_type: meta.content_type.clone(),
      body,
    })
  }

  fn route_request(&self, api_id: &str, method: &str, path: &str) -> Result<Option<RouteMatch>, ProviderError> {
    // Routes are only live through a stage that deploys them.
    let stages = self.list_records(ResourceKind::Stage)?;
    let deployed = stages.iter().any(|s| {
      s.spec.get("api").and_then(|v| v.as_str()) == Some(api_id)
        && s.spec.get("auto_deploy").and_then(|v| v.as_bool()).unwrap_or(true)
    });
    if !deployed {
      return Err(ProviderError::NotFound {
        kind: ResourceKind::Stage,
        name: format!("any auto-deployed stage of api {}", api_id),
      });
    }

    let best = self
      .list_records(ResourceKind::Route)?
      .into_iter()
      .filter(|r| r.spec.get("api").and_then(|v| v.as_str()) == Some(api_id))
      .filter_map(|r| {
        let key = r.attribute("route_key")?.to_string();
        Some((route_matches(&key, method, path)?, key, r))
      })
      .max_by_key(|(priority, _, _)| *priority);

    let Some((_, route_key, route)) = best else {
      return Ok(None);
    };

    let target = route.spec.get("target").and_then(|v| v.as_str()).unwrap_or_default();
    let integration_id = target.strip_prefix("integrations/").unwrap_or(target);
    let integration = self.require(
      self.find_by_attribute(ResourceKind::Integration, "id", integration_id)?,
      &route.name,
      target,
    )?;
    let uri = integration
      .spec
      .get("integration_uri")
      .and_then(|v| v.as_str())
      .unwrap_or_default();
    let function = self.require(self.function_for_uri(uri)?, &integration.name, uri)?;

    let permitted = self.list_records(ResourceKind::InvokePermission)?.iter().any(|p| {
      let target = p.spec.get("function").and_then(|v| v.as_str());
      let principal = p.spec.get("principal").and_then(|v| v.as_str());
      (target == Some(function.name.as_str()) || target == function.attribute("arn"))
        && principal == Some("apigateway.amazonaws.com")
    });
    if !permitted {
      return Err(ProviderError::AccessDenied(format!(
        "api {} may not invoke function {}",
        api_id, function.name
      )));
    }

    Ok(Some(RouteMatch {
      route: route.name.clone(),
      route_key,
      integration_id: integration_id.to_string(),
      function: function.name,
    }))
  }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), ProviderError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(io_err(parent))?;
  }
  let mut temp = path.as_os_str().to_owned();
  temp.push(".tmp");
  let temp = PathBuf::from(temp);
  fs::write(&temp, content).map_err(io_err(&temp))?;
  fs::rename(&temp, path).map_err(io_err(path))
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), ProviderError> {
  for entry in WalkDir::new(from).follow_links(true) {
    let entry = entry.map_err(|e| ProviderError::Io {
      path: from.to_path_buf(),
      message: e.to_string(),
    })?;
    let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
    let target = to.join(rel);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(io_err(&target))?;
    } else if entry.file_type().is_file() {
      fs::copy(entry.path(), &target).map_err(io_err(entry.path()))?;
    }
  }
  Ok(())
}
