//! In-memory provider.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{DesiredResource, LiveResource, Provider, ProviderError, attributes, physical_id, validate_desired};
use crate::asset::site_objects;
use crate::consts::{DEFAULT_ACCOUNT_ID, DEFAULT_REGION};
use crate::resource::{ResourceKind, ResourceSpec};

/// Keeps live resources in a map and counts every mutation.
///
/// Failures can be injected per resource name; an injected name fails every
/// create, update and delete until it is cleared.
#[derive(Debug)]
pub struct MemoryProvider {
  region: String,
  resources: Mutex<BTreeMap<(ResourceKind, String), LiveResource>>,
  fail: Mutex<BTreeSet<String>>,
  mutations: AtomicUsize,
  reads: AtomicUsize,
  history: Mutex<Vec<String>>,
}

impl Default for MemoryProvider {
  fn default() -> Self {
    Self::new(DEFAULT_REGION)
  }
}

impl MemoryProvider {
  pub fn new(region: &str) -> Self {
    Self {
      region: region.to_string(),
      resources: Mutex::new(BTreeMap::new()),
      fail: Mutex::new(BTreeSet::new()),
      mutations: AtomicUsize::new(0),
      reads: AtomicUsize::new(0),
      history: Mutex::new(Vec::new()),
    }
  }

  pub fn fail_on(&self, name: &str) {
    self.fail.lock().unwrap_or_else(|e| e.into_inner()).insert(name.to_string());
  }

  pub fn clear_failures(&self) {
    self.fail.lock().unwrap_or_else(|e| e.into_inner()).clear();
  }

  /// Creates, updates and deletes performed so far.
  pub fn mutations(&self) -> usize {
    self.mutations.load(Ordering::SeqCst)
  }

  pub fn reads(&self) -> usize {
    self.reads.load(Ordering::SeqCst)
  }

  pub fn reset_counters(&self) {
    self.mutations.store(0, Ordering::SeqCst);
    self.reads.store(0, Ordering::SeqCst);
    self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
  }

  /// Mutations in the order they happened, as `"<verb> <name>"`.
  pub fn history(&self) -> Vec<String> {
    self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  fn record(&self, verb: &str, name: &str) {
    self.mutations.fetch_add(1, Ordering::SeqCst);
    self
      .history
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(format!("{} {}", verb, name));
  }

  /// Snapshot of every live resource.
  pub fn live(&self) -> Vec<LiveResource> {
    self.lock().values().cloned().collect()
  }

  pub fn get(&self, kind: ResourceKind, name: &str) -> Option<LiveResource> {
    self.lock().get(&(kind, name.to_string())).cloned()
  }

  /// Insert a live resource directly, bypassing validation.
  pub fn insert(&self, resource: LiveResource) {
    self.lock().insert((resource.kind, resource.name.clone()), resource);
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(ResourceKind, String), LiveResource>> {
    self.resources.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn check_injected(&self, name: &str) -> Result<(), ProviderError> {
    if self.fail.lock().unwrap_or_else(|e| e.into_inner()).contains(name) {
      return Err(ProviderError::Injected(name.to_string()));
    }
    Ok(())
  }

  fn put(&self, desired: &DesiredResource, current: Option<&LiveResource>) -> Result<LiveResource, ProviderError> {
    self.check_injected(&desired.name)?;
    validate_desired(desired)?;

    let kind = desired.kind();
    let id = current
      .and_then(|c| c.attribute("id"))
      .map(str::to_string)
      .unwrap_or_else(|| physical_id(&self.region, kind, &desired.name));
    let mut attrs = attributes(&self.region, DEFAULT_ACCOUNT_ID, desired, &id);

    if let ResourceSpec::SiteContent(content) = &desired.spec {
      let count = if Path::new(&content.source).exists() {
        site_objects(&desired.name, content).map(|o| o.len()).unwrap_or(0)
      } else {
        0
      };
      attrs.insert("object_count".to_string(), count.to_string());
    }

    let live = LiveResource {
      kind,
      name: desired.name.clone(),
      spec: desired.spec.to_json(),
      asset_hash: desired.asset_hash.clone(),
      attributes: attrs,
    };
    self.insert(live.clone());
    self.record(if current.is_some() { "update" } else { "create" }, &desired.name);
    Ok(live)
  }
}

impl Provider for MemoryProvider {
  async fn read(&self, kind: ResourceKind, name: &str) -> Result<Option<LiveResource>, ProviderError> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    Ok(self.get(kind, name))
  }

  async fn create(&self, desired: &DesiredResource) -> Result<LiveResource, ProviderError> {
    self.put(desired, None)
  }

  async fn update(&self, desired: &DesiredResource, current: &LiveResource) -> Result<LiveResource, ProviderError> {
    self.put(desired, Some(current))
  }

  async fn delete(&self, current: &LiveResource) -> Result<(), ProviderError> {
    self.check_injected(&current.name)?;
    self.lock().remove(&(current.kind, current.name.clone()));
    self.record("delete", &current.name);
    Ok(())
  }
}
