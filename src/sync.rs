//! Background sync queue.
//!
//! Mutating requests issued while offline are persisted as a single JSON
//! array under a reserved identity in the api namespace and replayed when
//! the host fires the sync tag. Replay is best-effort, last-write-wins:
//! each action gets exactly one attempt, and the queue entry is deleted
//! after the pass regardless of per-item outcome, so a failed action is
//! dropped (preserved behavior, not a feature).

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::http::{Request, StoredResponse, Transport};
use crate::registry::{CacheRegistry, CacheRole, CacheStore};

/// A mutating request captured while the network was unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
  pub url: String,
  pub method: String,
  #[serde(default)]
  pub headers: Vec<(String, String)>,
  #[serde(default)]
  pub body: Option<serde_json::Value>,
  /// Application label for logging, e.g. "add-to-library".
  #[serde(rename = "type")]
  pub type_label: String,
}

impl OfflineAction {
  fn to_request(&self) -> Request {
    Request {
      method: self.method.to_uppercase(),
      url: self.url.clone(),
      headers: self.headers.clone(),
      body: self.body.as_ref().map(|v| v.to_string().into_bytes()),
    }
  }
}

pub struct SyncQueue<S: CacheStore + 'static> {
  registry: Arc<CacheRegistry<S>>,
  transport: Arc<dyn Transport>,
  sync_tag: String,
  queue_key: String,
}

impl<S: CacheStore + 'static> SyncQueue<S> {
  pub fn new(
    registry: Arc<CacheRegistry<S>>,
    transport: Arc<dyn Transport>,
    sync_tag: &str,
    queue_key: &str,
  ) -> Self {
    Self {
      registry,
      transport,
      sync_tag: sync_tag.to_string(),
      queue_key: queue_key.to_string(),
    }
  }

  fn namespace(&self) -> String {
    self.registry.namespace(CacheRole::Api)
  }

  /// Actions currently queued. An absent queue entry is an empty queue.
  pub fn pending(&self) -> Result<Vec<OfflineAction>> {
    let namespace = self.namespace();
    match self.registry.get(&namespace, &self.queue_key)? {
      Some(entry) => serde_json::from_slice(&entry.response.body)
        .map_err(|e| eyre!("Corrupt offline-action queue: {}", e)),
      None => Ok(Vec::new()),
    }
  }

  /// Append one action. The whole array is rewritten as a single entry; the
  /// storage layer has no per-item granularity.
  pub fn enqueue(&self, action: OfflineAction) -> Result<()> {
    let mut actions = match self.pending() {
      Ok(actions) => actions,
      Err(e) => {
        warn!("Discarding corrupt offline-action queue: {}", e);
        Vec::new()
      }
    };
    actions.push(action);

    let payload = serde_json::to_value(&actions)?;
    let namespace = self.namespace();
    self
      .registry
      .put(&namespace, &self.queue_key, &StoredResponse::json(&payload))
  }

  /// Replay the queue in order, one attempt per action, then delete the
  /// queue entry unconditionally. Unknown tags are ignored.
  pub async fn replay(&self, tag: &str) -> Result<()> {
    if tag != self.sync_tag {
      debug!("Ignoring unknown sync tag {}", tag);
      return Ok(());
    }

    let namespace = self.namespace();
    let entry = match self.registry.get(&namespace, &self.queue_key) {
      Ok(Some(entry)) => entry,
      Ok(None) => {
        debug!("No offline actions queued");
        return Ok(());
      }
      Err(e) => {
        warn!("Failed to read offline-action queue: {}", e);
        return Ok(());
      }
    };

    let actions: Vec<OfflineAction> = match serde_json::from_slice(&entry.response.body) {
      Ok(actions) => actions,
      Err(e) => {
        warn!("Corrupt offline-action queue, discarding: {}", e);
        Vec::new()
      }
    };

    let total = actions.len();
    for (index, action) in actions.iter().enumerate() {
      let request = action.to_request();
      match self.transport.send(&request).await {
        Ok(response) if response.ok() => {
          info!(
            "Replayed {} ({}/{}): {} {}",
            action.type_label,
            index + 1,
            total,
            action.method,
            action.url
          );
        }
        Ok(response) => {
          warn!(
            "Replay of {} ({} {}) returned {}",
            action.type_label, action.method, action.url, response.status
          );
        }
        Err(e) => {
          warn!(
            "Replay of {} ({} {}) failed: {}",
            action.type_label, action.method, action.url, e
          );
        }
      }
    }

    // One attempt per action; the queue is dropped whatever happened above.
    self.registry.delete(&namespace, &self.queue_key)?;
    Ok(())
  }
}
