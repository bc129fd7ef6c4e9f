//! Control channel: out-of-band requests from foreground callers.
//!
//! Foreground pages query and mutate engine state without going through the
//! fetch path: cache status, full clear, skip-waiting, and opportunistic
//! write-through of domain data the page already holds in memory. Requests
//! travel over an unbounded channel with a oneshot reply each, served by a
//! spawned task. Every handler is idempotent.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::http::StoredResponse;
use crate::lifecycle::LifecycleManager;
use crate::registry::{CacheRegistry, CacheRole, CacheStore};

/// Requests foreground callers may send.
#[derive(Debug)]
pub enum ControlRequest {
  /// Force immediate transition to `Active` without waiting.
  SkipWaiting,
  /// Count entries in each namespace at call time.
  GetCacheStatus,
  /// Delete every existing namespace regardless of generation.
  ClearCache,
  /// Opportunistic write-through of domain data into the api namespace.
  CacheDomainData { payload: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlReply {
  Ack,
  Status(CacheStatus),
}

/// Snapshot of cache occupancy. Storage failures degrade to zero counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
  pub namespace_count: u64,
  pub static_count: u64,
  pub api_count: u64,
  pub image_count: u64,
  pub last_updated: DateTime<Utc>,
}

/// Handles control requests against the registry and lifecycle.
pub struct Controller<S: CacheStore + 'static> {
  registry: Arc<CacheRegistry<S>>,
  lifecycle: Arc<LifecycleManager<S>>,
  api_prefix: String,
}

impl<S: CacheStore + 'static> Controller<S> {
  pub fn new(
    registry: Arc<CacheRegistry<S>>,
    lifecycle: Arc<LifecycleManager<S>>,
    api_prefix: &str,
  ) -> Self {
    Self {
      registry,
      lifecycle,
      api_prefix: api_prefix.to_string(),
    }
  }

  pub fn handle(&self, request: ControlRequest) -> Result<ControlReply> {
    match request {
      ControlRequest::SkipWaiting => {
        self.lifecycle.skip_waiting()?;
        Ok(ControlReply::Ack)
      }
      ControlRequest::GetCacheStatus => Ok(ControlReply::Status(self.status())),
      ControlRequest::ClearCache => {
        self.clear_cache();
        Ok(ControlReply::Ack)
      }
      ControlRequest::CacheDomainData { payload } => {
        self.cache_domain_data(&payload);
        Ok(ControlReply::Ack)
      }
    }
  }

  fn status(&self) -> CacheStatus {
    let count = |role: CacheRole| {
      self
        .registry
        .count_entries(&self.registry.namespace(role))
        .unwrap_or(0)
    };

    CacheStatus {
      namespace_count: self
        .registry
        .list_namespace_names()
        .map(|names| names.len() as u64)
        .unwrap_or(0),
      static_count: count(CacheRole::Static),
      api_count: count(CacheRole::Api),
      image_count: count(CacheRole::Image),
      last_updated: Utc::now(),
    }
  }

  fn clear_cache(&self) {
    let names = self.registry.list_namespace_names().unwrap_or_default();
    for name in names {
      match self.registry.delete_namespace(&name) {
        Ok(()) => debug!("Cleared namespace {}", name),
        Err(e) => warn!("Failed to clear namespace {}: {}", name, e),
      }
    }
  }

  /// Store recognized domain objects under synthesized identities so the
  /// cache is warm before any request has passed through the fetch path.
  fn cache_domain_data(&self, payload: &serde_json::Value) {
    let api = self.registry.namespace(CacheRole::Api);

    if let Some(manga) = payload.get("manga") {
      match manga.get("id").map(json_id) {
        Some(id) => {
          let identity = format!("GET {}manga/{}", self.api_prefix, id);
          match self.registry.put(&api, &identity, &StoredResponse::json(manga)) {
            Ok(()) => debug!("Cached manga {} via write-through", id),
            Err(e) => warn!("Write-through for manga {} failed: {}", id, e),
          }
        }
        None => warn!("CacheDomainData manga payload has no id, skipping"),
      }
    }

    if let Some(preferences) = payload.get("preferences") {
      let identity = format!("GET {}user/preferences", self.api_prefix);
      match self
        .registry
        .put(&api, &identity, &StoredResponse::json(preferences))
      {
        Ok(()) => debug!("Cached user preferences via write-through"),
        Err(e) => warn!("Write-through for preferences failed: {}", e),
      }
    }
  }

  /// Spawn the serving task and return the foreground handle.
  pub fn spawn(self) -> ControlHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<ControlExchange>();

    tokio::spawn(async move {
      while let Some((request, reply)) = rx.recv().await {
        let result = self.handle(request);
        // A dropped reply just means the caller went away.
        let _ = reply.send(result);
      }
    });

    ControlHandle { tx }
  }
}

impl<S: CacheStore + 'static> Clone for Controller<S> {
  fn clone(&self) -> Self {
    Self {
      registry: Arc::clone(&self.registry),
      lifecycle: Arc::clone(&self.lifecycle),
      api_prefix: self.api_prefix.clone(),
    }
  }
}

/// Stringify a JSON id, accepting both `"42"` and `42`.
fn json_id(value: &serde_json::Value) -> String {
  match value.as_str() {
    Some(s) => s.to_string(),
    None => value.to_string(),
  }
}

type ControlExchange = (ControlRequest, oneshot::Sender<Result<ControlReply>>);

/// Foreground side of the control channel.
#[derive(Clone)]
pub struct ControlHandle {
  tx: mpsc::UnboundedSender<ControlExchange>,
}

impl ControlHandle {
  pub async fn request(&self, request: ControlRequest) -> Result<ControlReply> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send((request, reply_tx))
      .map_err(|_| eyre!("Control channel closed"))?;
    reply_rx
      .await
      .map_err(|_| eyre!("Control channel dropped the reply"))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::registry::SqliteStore;
  use crate::testutil::MockTransport;

  fn controller() -> (Controller<SqliteStore>, Arc<CacheRegistry<SqliteStore>>) {
    let config = Arc::new(EngineConfig::default());
    let registry = Arc::new(CacheRegistry::new(
      SqliteStore::open_in_memory().unwrap(),
      &config.version,
    ));
    let lifecycle = Arc::new(LifecycleManager::new(
      Arc::clone(&registry),
      MockTransport::new(),
      Arc::clone(&config),
    ));
    let controller = Controller::new(Arc::clone(&registry), lifecycle, &config.api_prefix);
    (controller, registry)
  }

  fn put_json(registry: &CacheRegistry<SqliteStore>, namespace: &str, identity: &str) {
    registry
      .put(namespace, identity, &StoredResponse::json(&serde_json::json!(1)))
      .unwrap();
  }

  #[test]
  fn status_counts_each_namespace() {
    let (controller, registry) = controller();
    let static_ns = registry.namespace(CacheRole::Static);
    let api_ns = registry.namespace(CacheRole::Api);
    put_json(&registry, &static_ns, "GET /");
    put_json(&registry, &static_ns, "GET /app.js");
    put_json(&registry, &api_ns, "GET /api/genres");

    let reply = controller.handle(ControlRequest::GetCacheStatus).unwrap();
    let ControlReply::Status(status) = reply else {
      panic!("expected status reply");
    };
    assert_eq!(status.namespace_count, 2);
    assert_eq!(status.static_count, 2);
    assert_eq!(status.api_count, 1);
    assert_eq!(status.image_count, 0);
  }

  #[test]
  fn status_degrades_to_zero_counts_when_storage_fails() {
    let config = Arc::new(EngineConfig::default());
    let registry = Arc::new(CacheRegistry::new(
      crate::testutil::FailingStore,
      &config.version,
    ));
    let lifecycle = Arc::new(LifecycleManager::new(
      Arc::clone(&registry),
      MockTransport::new(),
      Arc::clone(&config),
    ));
    let controller = Controller::new(Arc::clone(&registry), lifecycle, &config.api_prefix);

    // A broken store yields zeros, not an error.
    let reply = controller.handle(ControlRequest::GetCacheStatus).unwrap();
    let ControlReply::Status(status) = reply else {
      panic!("expected status reply");
    };
    assert_eq!(status.namespace_count, 0);
    assert_eq!(status.static_count, 0);
    assert_eq!(status.api_count, 0);
    assert_eq!(status.image_count, 0);
  }

  #[test]
  fn clear_cache_is_idempotent() {
    let (controller, registry) = controller();
    put_json(&registry, "static-v1.0.0", "GET /old");
    put_json(&registry, &registry.namespace(CacheRole::Api), "GET /api/genres");

    // Clearing removes every namespace regardless of generation.
    controller.handle(ControlRequest::ClearCache).unwrap();
    assert!(registry.list_namespace_names().unwrap().is_empty());

    // A second clear is a no-op, not an error.
    controller.handle(ControlRequest::ClearCache).unwrap();
    assert!(registry.list_namespace_names().unwrap().is_empty());
  }

  #[test]
  fn cache_domain_data_stores_manga_under_a_synthesized_identity() {
    // Scenario: write-through of a manga object with id "42".
    let (controller, registry) = controller();
    let manga = serde_json::json!({ "id": "42", "title": "Fullmetal Alchemist" });

    controller
      .handle(ControlRequest::CacheDomainData {
        payload: serde_json::json!({ "manga": manga }),
      })
      .unwrap();

    let api = registry.namespace(CacheRole::Api);
    let entry = registry.get(&api, "GET /api/manga/42").unwrap().unwrap();
    assert_eq!(entry.response.body_json().unwrap(), manga);
  }

  #[test]
  fn cache_domain_data_accepts_numeric_ids_and_preferences() {
    let (controller, registry) = controller();
    let payload = serde_json::json!({
      "manga": { "id": 7, "title": "Berserk" },
      "preferences": { "theme": "dark", "readingDirection": "rtl" },
    });

    controller
      .handle(ControlRequest::CacheDomainData { payload })
      .unwrap();

    let api = registry.namespace(CacheRole::Api);
    assert!(registry.get(&api, "GET /api/manga/7").unwrap().is_some());
    let prefs = registry
      .get(&api, "GET /api/user/preferences")
      .unwrap()
      .unwrap();
    assert_eq!(
      prefs.response.body_json().unwrap()["theme"],
      serde_json::json!("dark")
    );
  }

  #[test]
  fn cache_domain_data_without_known_objects_is_a_no_op() {
    let (controller, registry) = controller();
    controller
      .handle(ControlRequest::CacheDomainData {
        payload: serde_json::json!({ "unrelated": true }),
      })
      .unwrap();

    let api = registry.namespace(CacheRole::Api);
    assert_eq!(registry.count_entries(&api).unwrap(), 0);
  }

  #[tokio::test]
  async fn requests_round_trip_over_the_spawned_channel() {
    let (controller, registry) = controller();
    put_json(&registry, &registry.namespace(CacheRole::Api), "GET /api/genres");

    let handle = controller.spawn();
    let reply = handle.request(ControlRequest::GetCacheStatus).await.unwrap();
    let ControlReply::Status(status) = reply else {
      panic!("expected status reply");
    };
    assert_eq!(status.api_count, 1);

    let reply = handle.request(ControlRequest::ClearCache).await.unwrap();
    assert_eq!(reply, ControlReply::Ack);
    assert!(registry.list_namespace_names().unwrap().is_empty());
  }
}
