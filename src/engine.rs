//! The engine: one typed event union, one dispatch function per event kind.
//!
//! Composes the classifier, registry, strategy executor, lifecycle manager,
//! control channel and sync queue over an injected store and transport, so
//! the whole thing runs without any host runtime and multiple
//! independently-configured instances can coexist.

use color_eyre::Result;
use std::sync::Arc;
use tracing::debug;

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::control::{ControlHandle, ControlReply, ControlRequest, Controller};
use crate::fallback::FallbackTable;
use crate::http::{Request, StoredResponse, Transport};
use crate::lifecycle::{LifecycleManager, LifecycleState};
use crate::registry::{CacheRegistry, CacheStore};
use crate::strategy::StrategyExecutor;
use crate::sync::{OfflineAction, SyncQueue};

/// Everything the host environment can deliver to the engine.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  Message(ControlRequest),
  Sync(String),
}

/// What a dispatched event produced.
#[derive(Debug)]
pub enum EventOutcome {
  Completed,
  Response(StoredResponse),
  Reply(ControlReply),
}

pub struct Engine<S: CacheStore + 'static> {
  classifier: Classifier,
  registry: Arc<CacheRegistry<S>>,
  strategy: StrategyExecutor<S>,
  lifecycle: Arc<LifecycleManager<S>>,
  controller: Controller<S>,
  sync: SyncQueue<S>,
}

impl<S: CacheStore + 'static> Engine<S> {
  pub fn new(config: EngineConfig, store: S, transport: Arc<dyn Transport>) -> Self {
    let config = Arc::new(config);
    let registry = Arc::new(CacheRegistry::new(store, &config.version));
    let classifier = Classifier::new(&config);
    let fallbacks = Arc::new(FallbackTable::new(config.offline_fallbacks.clone()));
    let strategy = StrategyExecutor::new(
      Arc::clone(&registry),
      Arc::clone(&transport),
      fallbacks,
      &config.shell_path,
    );
    let lifecycle = Arc::new(LifecycleManager::new(
      Arc::clone(&registry),
      Arc::clone(&transport),
      Arc::clone(&config),
    ));
    let controller = Controller::new(Arc::clone(&registry), Arc::clone(&lifecycle), &config.api_prefix);
    let sync = SyncQueue::new(
      Arc::clone(&registry),
      Arc::clone(&transport),
      &config.sync_tag,
      &config.queue_key,
    );

    Self {
      classifier,
      registry,
      strategy,
      lifecycle,
      controller,
      sync,
    }
  }

  /// Route one event to its handler.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
    match event {
      WorkerEvent::Install => {
        self.handle_install().await?;
        Ok(EventOutcome::Completed)
      }
      WorkerEvent::Activate => {
        self.handle_activate().await?;
        Ok(EventOutcome::Completed)
      }
      WorkerEvent::Fetch(request) => {
        let response = self.handle_fetch(&request).await?;
        Ok(EventOutcome::Response(response))
      }
      WorkerEvent::Message(request) => {
        let reply = self.handle_message(request)?;
        Ok(EventOutcome::Reply(reply))
      }
      WorkerEvent::Sync(tag) => {
        self.handle_sync(&tag).await?;
        Ok(EventOutcome::Completed)
      }
    }
  }

  pub async fn handle_install(&self) -> Result<()> {
    self.lifecycle.install().await
  }

  pub async fn handle_activate(&self) -> Result<()> {
    self.lifecycle.activate().await
  }

  /// Classify and execute one intercepted request.
  pub async fn handle_fetch(&self, request: &Request) -> Result<StoredResponse> {
    let class = self.classifier.classify(&request.path());
    debug!("{} classified as {}", request.identity(), class);
    self.strategy.execute(class, request).await
  }

  pub fn handle_message(&self, request: ControlRequest) -> Result<ControlReply> {
    self.controller.handle(request)
  }

  pub async fn handle_sync(&self, tag: &str) -> Result<()> {
    self.sync.replay(tag).await
  }

  /// Queue a mutating request for replay on the next sync event.
  pub fn enqueue_offline_action(&self, action: OfflineAction) -> Result<()> {
    self.sync.enqueue(action)
  }

  /// Spawn a control-channel serving task for foreground callers.
  pub fn control_channel(&self) -> ControlHandle {
    self.controller.clone().spawn()
  }

  pub fn state(&self) -> LifecycleState {
    self.lifecycle.state()
  }

  pub fn registry(&self) -> &CacheRegistry<S> {
    &self.registry
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::{CacheRole, SqliteStore};
  use crate::testutil::MockTransport;

  fn engine(transport: Arc<MockTransport>) -> Engine<SqliteStore> {
    Engine::new(
      EngineConfig::default(),
      SqliteStore::open_in_memory().unwrap(),
      transport,
    )
  }

  #[tokio::test]
  async fn full_lifecycle_then_offline_navigation_serves_the_shell() {
    let transport = MockTransport::new();
    transport.route("/", StoredResponse::html("<html>shell</html>"));
    transport.route("/manifest.json", StoredResponse::json(&serde_json::json!({})));
    transport.route("/images/placeholder.png", StoredResponse::html("png"));
    transport.route("/offline.html", StoredResponse::html("<html>offline</html>"));
    let engine = engine(Arc::clone(&transport));

    engine.dispatch(WorkerEvent::Install).await.unwrap();
    engine.dispatch(WorkerEvent::Activate).await.unwrap();
    assert_eq!(engine.state(), LifecycleState::Active);

    transport.set_offline(true);
    let outcome = engine
      .dispatch(WorkerEvent::Fetch(Request::get("/library")))
      .await
      .unwrap();
    let EventOutcome::Response(response) = outcome else {
      panic!("expected a response");
    };
    assert_eq!(response.body, b"<html>shell</html>");
  }

  #[tokio::test]
  async fn status_reflects_fetches_that_passed_through() {
    let transport = MockTransport::new();
    let payload = serde_json::json!([1, 2, 3, 4, 5]);
    transport.route("/api/sections/trending", StoredResponse::json(&payload));
    let engine = engine(transport);

    let response = engine
      .handle_fetch(&Request::get("/api/sections/trending"))
      .await
      .unwrap();
    assert_eq!(response.body_json().unwrap(), payload);

    let reply = engine.handle_message(ControlRequest::GetCacheStatus).unwrap();
    let ControlReply::Status(status) = reply else {
      panic!("expected status reply");
    };
    assert_eq!(status.api_count, 1);
  }

  #[tokio::test]
  async fn sync_events_route_to_the_queue() {
    let transport = MockTransport::new();
    transport.route(
      "/api/user/library",
      StoredResponse::json(&serde_json::json!({ "ok": true })),
    );
    let engine = engine(Arc::clone(&transport));

    engine
      .enqueue_offline_action(OfflineAction {
        url: "/api/user/library".to_string(),
        method: "POST".to_string(),
        headers: Vec::new(),
        body: None,
        type_label: "add-to-library".to_string(),
      })
      .unwrap();

    engine
      .dispatch(WorkerEvent::Sync("inkcache-replay".to_string()))
      .await
      .unwrap();
    assert_eq!(transport.calls(), vec!["POST /api/user/library"]);

    let api = engine.registry().namespace(CacheRole::Api);
    assert!(engine.registry().get(&api, "offline-actions").unwrap().is_none());
  }
}
