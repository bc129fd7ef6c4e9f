//! Cache registry: named, generation-versioned namespaces over a store.
//!
//! Three logical roles (static assets, API responses, images) resolve to
//! concrete namespace names by appending the configured version, e.g.
//! `static-v2.0.0`. Bumping the version makes a whole new generation; the
//! lifecycle manager evicts prior generations in bulk on activation.

mod store;

pub use store::{CacheEntry, CacheStore, SqliteStore};

use color_eyre::Result;
use std::sync::Arc;

use crate::http::StoredResponse;

/// Logical role of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRole {
  Static,
  Api,
  Image,
}

impl CacheRole {
  pub const ALL: [CacheRole; 3] = [CacheRole::Static, CacheRole::Api, CacheRole::Image];

  pub fn prefix(&self) -> &'static str {
    match self {
      CacheRole::Static => "static",
      CacheRole::Api => "api",
      CacheRole::Image => "image",
    }
  }
}

/// Registry resolving roles to concrete namespaces and delegating storage.
pub struct CacheRegistry<S: CacheStore> {
  store: Arc<S>,
  version: String,
}

impl<S: CacheStore> CacheRegistry<S> {
  pub fn new(store: S, version: &str) -> Self {
    Self {
      store: Arc::new(store),
      version: version.to_string(),
    }
  }

  /// Concrete namespace name for a role in the current generation.
  pub fn namespace(&self, role: CacheRole) -> String {
    format!("{}-{}", role.prefix(), self.version)
  }

  /// The three canonical current-generation names.
  pub fn canonical_names(&self) -> Vec<String> {
    CacheRole::ALL.iter().map(|role| self.namespace(*role)).collect()
  }

  /// Open a role's namespace, creating it on first access. Idempotent.
  pub fn open(&self, role: CacheRole) -> Result<String> {
    let name = self.namespace(role);
    self.store.ensure_namespace(&name)?;
    Ok(name)
  }

  pub fn get(&self, namespace: &str, identity: &str) -> Result<Option<CacheEntry>> {
    self.store.get(namespace, identity)
  }

  pub fn put(&self, namespace: &str, identity: &str, response: &StoredResponse) -> Result<()> {
    self.store.put(namespace, identity, response)
  }

  pub fn delete(&self, namespace: &str, identity: &str) -> Result<()> {
    self.store.delete(namespace, identity)
  }

  pub fn delete_namespace(&self, name: &str) -> Result<()> {
    self.store.delete_namespace(name)
  }

  pub fn list_namespace_names(&self) -> Result<Vec<String>> {
    self.store.list_namespaces()
  }

  pub fn count_entries(&self, namespace: &str) -> Result<u64> {
    self.store.count_entries(namespace)
  }
}

impl<S: CacheStore> Clone for CacheRegistry<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      version: self.version.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry() -> CacheRegistry<SqliteStore> {
    CacheRegistry::new(SqliteStore::open_in_memory().unwrap(), "v2.0.0")
  }

  #[test]
  fn roles_resolve_to_generation_tagged_names() {
    let registry = registry();
    assert_eq!(registry.namespace(CacheRole::Static), "static-v2.0.0");
    assert_eq!(registry.namespace(CacheRole::Api), "api-v2.0.0");
    assert_eq!(registry.namespace(CacheRole::Image), "image-v2.0.0");
  }

  #[test]
  fn open_is_idempotent() {
    let registry = registry();
    let first = registry.open(CacheRole::Api).unwrap();
    let second = registry.open(CacheRole::Api).unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.list_namespace_names().unwrap().len(), 1);
  }

  #[test]
  fn entries_in_a_prior_generation_are_separate() {
    let store = SqliteStore::open_in_memory().unwrap();
    let old = CacheRegistry::new(store, "v1.0.0");
    let ns = old.open(CacheRole::Api).unwrap();
    old
      .put(&ns, "GET /api/genres", &StoredResponse::json(&serde_json::json!([])))
      .unwrap();

    // Same store, new generation: a clone with a bumped version sees nothing.
    let new = CacheRegistry {
      store: Arc::clone(&old.store),
      version: "v2.0.0".to_string(),
    };
    let ns = new.namespace(CacheRole::Api);
    assert!(new.get(&ns, "GET /api/genres").unwrap().is_none());
  }
}
