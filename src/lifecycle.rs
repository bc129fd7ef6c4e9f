//! Install/activate state machine.
//!
//! Installing primes the static namespace with the precache manifest and
//! writes an install marker; activating evicts every namespace that is not
//! part of the current generation. Priming is best-effort: a missing
//! manifest resource is logged and skipped, never blocks activation.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::http::{Request, StoredResponse, Transport};
use crate::registry::{CacheRegistry, CacheRole, CacheStore};

/// Reserved identity of the install marker in the api namespace.
pub const INSTALL_MARKER_KEY: &str = "install-marker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Waiting,
  Active,
}

pub struct LifecycleManager<S: CacheStore + 'static> {
  registry: Arc<CacheRegistry<S>>,
  transport: Arc<dyn Transport>,
  config: Arc<EngineConfig>,
  state: Mutex<LifecycleState>,
}

impl<S: CacheStore + 'static> LifecycleManager<S> {
  pub fn new(
    registry: Arc<CacheRegistry<S>>,
    transport: Arc<dyn Transport>,
    config: Arc<EngineConfig>,
  ) -> Self {
    Self {
      registry,
      transport,
      config,
      state: Mutex::new(LifecycleState::Installing),
    }
  }

  pub fn state(&self) -> LifecycleState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(LifecycleState::Installing)
  }

  fn set_state(&self, next: LifecycleState) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *state = next;
    Ok(())
  }

  /// Install: open all namespaces, prime the precache manifest, write the
  /// install marker, then request immediate activation rather than waiting
  /// for old instances to wind down.
  pub async fn install(&self) -> Result<()> {
    self.set_state(LifecycleState::Installing)?;

    for role in CacheRole::ALL {
      self.registry.open(role)?;
    }

    self.prime_static().await;

    let marker = serde_json::json!({
      "version": self.config.version,
      "installed_at": Utc::now().to_rfc3339(),
    });
    let api = self.registry.namespace(CacheRole::Api);
    if let Err(e) = self
      .registry
      .put(&api, INSTALL_MARKER_KEY, &StoredResponse::json(&marker))
    {
      warn!("Failed to write install marker: {}", e);
    }

    self.set_state(LifecycleState::Waiting)?;
    info!(
      "Installed generation {}, requesting immediate activation",
      self.config.version
    );
    Ok(())
  }

  /// Activate: evict every namespace outside the current generation, then
  /// take over serving. Claiming already-open callers is the host's job.
  pub async fn activate(&self) -> Result<()> {
    let canonical = self.registry.canonical_names();

    let names = match self.registry.list_namespace_names() {
      Ok(names) => names,
      Err(e) => {
        warn!("Failed to list namespaces during activation: {}", e);
        Vec::new()
      }
    };

    for name in names {
      if canonical.contains(&name) {
        continue;
      }
      match self.registry.delete_namespace(&name) {
        Ok(()) => info!("Evicted superseded namespace {}", name),
        Err(e) => warn!("Failed to evict namespace {}: {}", name, e),
      }
    }

    self.set_state(LifecycleState::Active)?;
    info!("Generation {} active", self.config.version);
    Ok(())
  }

  /// Force the transition to `Active` without waiting.
  pub fn skip_waiting(&self) -> Result<()> {
    self.set_state(LifecycleState::Active)?;
    debug!("Skip-waiting requested, now active");
    Ok(())
  }

  /// Fetch every manifest resource concurrently into the static namespace.
  async fn prime_static(&self) {
    let namespace = self.registry.namespace(CacheRole::Static);
    let total = self.config.precache_manifest.len();

    let results = futures::future::join_all(
      self
        .config
        .precache_manifest
        .iter()
        .map(|path| self.prime_one(&namespace, path)),
    )
    .await;

    let primed = results.into_iter().filter(|ok| *ok).count();
    info!("Primed {}/{} precache resources", primed, total);
  }

  async fn prime_one(&self, namespace: &str, path: &str) -> bool {
    let request = Request::get(path);
    match self.transport.send(&request).await {
      Ok(response) if response.ok() => {
        match self.registry.put(namespace, &request.identity(), &response) {
          Ok(()) => true,
          Err(e) => {
            warn!("Failed to store precache resource {}: {}", path, e);
            false
          }
        }
      }
      Ok(response) => {
        warn!("Precache fetch for {} returned {}", path, response.status);
        false
      }
      Err(e) => {
        warn!("Precache fetch for {} failed: {}", path, e);
        false
      }
    }
  }
}
