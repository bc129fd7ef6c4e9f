//! Offline-first caching and background sync engine for a manga reading
//! client.
//!
//! The engine intercepts the client's network traffic, classifies each
//! request, and applies a per-class caching strategy over three
//! generation-versioned namespaces (static assets, API responses, images):
//!
//! - cache-first with detached background refresh for static assets and
//!   slow-changing API data,
//! - network-first with cache fallback for images and volatile API calls,
//! - navigations that always end in a renderable document, down to an
//!   embedded offline page.
//!
//! Foreground callers reach the engine out-of-band through a message-based
//! control channel (status, clear, skip-waiting, write-through caching), and
//! mutating requests queued while offline are replayed when the host fires
//! the background sync tag.

pub mod classify;
pub mod config;
pub mod control;
pub mod engine;
pub mod fallback;
pub mod http;
pub mod lifecycle;
pub mod registry;
pub mod strategy;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use classify::{Classifier, ResourceClass};
pub use config::EngineConfig;
pub use control::{CacheStatus, ControlHandle, ControlReply, ControlRequest, Controller};
pub use engine::{Engine, EventOutcome, WorkerEvent};
pub use fallback::FallbackTable;
pub use http::{HttpTransport, Request, StoredResponse, Transport};
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use registry::{CacheEntry, CacheRegistry, CacheRole, CacheStore, SqliteStore};
pub use strategy::StrategyExecutor;
pub use sync::{OfflineAction, SyncQueue};
