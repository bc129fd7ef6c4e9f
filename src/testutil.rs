//! Test support: a scriptable in-memory transport and a broken store.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::http::{Request, StoredResponse, Transport};
use crate::registry::{CacheEntry, CacheStore};

/// Transport serving canned responses by URL, with switchable failure modes.
/// Records every request it sees.
pub struct MockTransport {
  routes: Mutex<HashMap<String, StoredResponse>>,
  failing: Mutex<HashSet<String>>,
  offline: AtomicBool,
  requests: Mutex<Vec<Request>>,
}

impl MockTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      routes: Mutex::new(HashMap::new()),
      failing: Mutex::new(HashSet::new()),
      offline: AtomicBool::new(false),
      requests: Mutex::new(Vec::new()),
    })
  }

  pub fn route(&self, url: &str, response: StoredResponse) {
    self.routes.lock().unwrap().insert(url.to_string(), response);
  }

  /// Make one URL fail even while the rest of the network is up.
  pub fn fail(&self, url: &str) {
    self.failing.lock().unwrap().insert(url.to_string());
  }

  /// Simulate total loss of connectivity.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Identities of all requests sent, in order.
  pub fn calls(&self) -> Vec<String> {
    self.requests.lock().unwrap().iter().map(|r| r.identity()).collect()
  }

  /// Full copies of all requests sent, in order.
  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }
}

/// Store where every operation fails, for exercising storage-degradation
/// paths: reads become misses and status counts become zero.
pub struct FailingStore;

impl CacheStore for FailingStore {
  fn ensure_namespace(&self, _name: &str) -> Result<()> {
    Err(eyre!("storage unavailable"))
  }

  fn get(&self, _namespace: &str, _identity: &str) -> Result<Option<CacheEntry>> {
    Err(eyre!("storage unavailable"))
  }

  fn put(&self, _namespace: &str, _identity: &str, _response: &StoredResponse) -> Result<()> {
    Err(eyre!("storage unavailable"))
  }

  fn delete(&self, _namespace: &str, _identity: &str) -> Result<()> {
    Err(eyre!("storage unavailable"))
  }

  fn delete_namespace(&self, _name: &str) -> Result<()> {
    Err(eyre!("storage unavailable"))
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    Err(eyre!("storage unavailable"))
  }

  fn count_entries(&self, _namespace: &str) -> Result<u64> {
    Err(eyre!("storage unavailable"))
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: &Request) -> Result<StoredResponse> {
    self.requests.lock().unwrap().push(request.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable"));
    }
    if self.failing.lock().unwrap().contains(&request.url) {
      return Err(eyre!("connection reset: {}", request.url));
    }
    match self.routes.lock().unwrap().get(&request.url) {
      Some(response) => Ok(response.clone()),
      None => Err(eyre!("no route for {}", request.url)),
    }
  }
}
