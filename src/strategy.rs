//! Strategy executor: the order in which cache and network are consulted.
//!
//! Three strategies, selected by resource class. Static assets and
//! slow-changing API data answer from cache immediately and refresh in the
//! background; volatile or auth-sensitive calls and images try the network
//! first and degrade to cache; navigations always end in a renderable
//! document, even with zero connectivity.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::ResourceClass;
use crate::fallback::FallbackTable;
use crate::http::{Request, StoredResponse, Transport};
use crate::registry::{CacheRegistry, CacheRole, CacheStore};

/// Self-contained document served when a navigation has no network, no exact
/// cached match and no cached app shell. Must never depend on another fetch.
const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
  body { font-family: sans-serif; background: #14141f; color: #eee;
         display: flex; align-items: center; justify-content: center;
         height: 100vh; margin: 0; text-align: center; }
  button { background: #e8554d; color: #fff; border: 0; border-radius: 6px;
           padding: 12px 28px; font-size: 16px; cursor: pointer; }
</style>
</head>
<body>
<div>
  <h1>You&rsquo;re offline</h1>
  <p>Your library and recently read chapters are still available once you reconnect.</p>
  <button onclick="location.reload()">Try again</button>
</div>
</body>
</html>
"#;

/// Executes the caching strategy selected by a request's resource class.
pub struct StrategyExecutor<S: CacheStore + 'static> {
  registry: Arc<CacheRegistry<S>>,
  transport: Arc<dyn Transport>,
  fallbacks: Arc<FallbackTable>,
  shell_path: String,
}

impl<S: CacheStore + 'static> StrategyExecutor<S> {
  pub fn new(
    registry: Arc<CacheRegistry<S>>,
    transport: Arc<dyn Transport>,
    fallbacks: Arc<FallbackTable>,
    shell_path: &str,
  ) -> Self {
    Self {
      registry,
      transport,
      fallbacks,
      shell_path: shell_path.to_string(),
    }
  }

  /// Handle one classified request.
  pub async fn execute(&self, class: ResourceClass, request: &Request) -> Result<StoredResponse> {
    match class {
      ResourceClass::StaticAsset | ResourceClass::ApiShortCache | ResourceClass::ApiLongCache => {
        self.cache_first(class, request).await
      }
      ResourceClass::Image | ResourceClass::ApiNetworkFirst => {
        self.network_first(class, request).await
      }
      ResourceClass::Navigation => self.navigate(request).await,
    }
  }

  /// Cache-first with detached background refresh.
  ///
  /// A hit answers immediately; the refresh fetch is spawned and never
  /// observed by the caller. A miss falls through to the network, then to
  /// the fallback table for API classes.
  async fn cache_first(&self, class: ResourceClass, request: &Request) -> Result<StoredResponse> {
    let namespace = self.registry.namespace(class.role());
    let identity = request.identity();

    match self.registry.get(&namespace, &identity) {
      Ok(Some(entry)) => {
        self.spawn_refresh(namespace, identity, request.clone());
        return Ok(entry.response);
      }
      Ok(None) => {}
      Err(e) => {
        // Storage failure is an ordinary miss.
        warn!("Cache read failed for {}: {}", identity, e);
      }
    }

    match self.fetch_and_store(&namespace, &identity, request).await {
      Ok(response) => Ok(response),
      Err(err) => {
        if class.is_api() {
          if let Some(response) = self.fallbacks.synthesize(&request.path()) {
            info!("Serving offline fallback for {}", request.path());
            return Ok(response);
          }
        }
        Err(err)
      }
    }
  }

  /// Network-first with cache fallback, then the fallback table (API only).
  async fn network_first(&self, class: ResourceClass, request: &Request) -> Result<StoredResponse> {
    let namespace = self.registry.namespace(class.role());
    let identity = request.identity();

    match self.fetch_and_store(&namespace, &identity, request).await {
      Ok(response) => Ok(response),
      Err(err) => {
        if let Ok(Some(entry)) = self.registry.get(&namespace, &identity) {
          debug!("Network failed, serving cached {}", identity);
          return Ok(entry.response);
        }
        if class.is_api() {
          if let Some(response) = self.fallbacks.synthesize(&request.path()) {
            info!("Serving offline fallback for {}", request.path());
            return Ok(response);
          }
        }
        Err(err)
      }
    }
  }

  /// Navigation: network, exact cached match, cached app shell, then the
  /// embedded offline page. The terminal fallback cannot fail.
  async fn navigate(&self, request: &Request) -> Result<StoredResponse> {
    let namespace = self.registry.namespace(CacheRole::Static);
    let identity = request.identity();

    match self.fetch_and_store(&namespace, &identity, request).await {
      Ok(response) => Ok(response),
      Err(err) => {
        debug!("Navigation fetch failed for {}: {}", identity, err);

        if let Ok(Some(entry)) = self.registry.get(&namespace, &identity) {
          return Ok(entry.response);
        }

        let shell_identity = format!("GET {}", self.shell_path);
        if let Ok(Some(entry)) = self.registry.get(&namespace, &shell_identity) {
          debug!("Serving app shell for {}", identity);
          return Ok(entry.response);
        }

        Ok(StoredResponse::html(OFFLINE_PAGE))
      }
    }
  }

  /// Fetch from the network and, on an ok response, write through to cache.
  /// A failed cache write is logged; the caller still gets the response.
  async fn fetch_and_store(
    &self,
    namespace: &str,
    identity: &str,
    request: &Request,
  ) -> Result<StoredResponse> {
    let response = self.transport.send(request).await?;
    if response.ok() {
      if let Err(e) = self.registry.put(namespace, identity, &response) {
        warn!("Cache write failed for {}: {}", identity, e);
      }
    }
    Ok(response)
  }

  /// Detached refresh after a cache hit. Best-effort: every outcome is
  /// logged, none is propagated; the caller already has a response.
  fn spawn_refresh(&self, namespace: String, identity: String, request: Request) {
    let registry = Arc::clone(&self.registry);
    let transport = Arc::clone(&self.transport);

    tokio::spawn(async move {
      match transport.send(&request).await {
        Ok(response) if response.ok() => {
          if let Err(e) = registry.put(&namespace, &identity, &response) {
            warn!("Background refresh write failed for {}: {}", identity, e);
          } else {
            debug!("Background refresh updated {}", identity);
          }
        }
        Ok(response) => {
          debug!(
            "Background refresh for {} returned {}, keeping cached entry",
            identity, response.status
          );
        }
        Err(e) => {
          debug!("Background refresh failed for {}: {}", identity, e);
        }
      }
    });
  }
}

impl<S: CacheStore + 'static> Clone for StrategyExecutor<S> {
  fn clone(&self) -> Self {
    Self {
      registry: Arc::clone(&self.registry),
      transport: Arc::clone(&self.transport),
      fallbacks: Arc::clone(&self.fallbacks),
      shell_path: self.shell_path.clone(),
    }
  }
}
