//! Offline fallback table.
//!
//! Static defaults returned when both cache and network fail for a known API
//! path. Consulted only for API resource classes.

use std::collections::BTreeMap;

use crate::http::StoredResponse;

/// Map from API path to default JSON payload.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
  entries: BTreeMap<String, serde_json::Value>,
}

impl FallbackTable {
  pub fn new(entries: BTreeMap<String, serde_json::Value>) -> Self {
    Self { entries }
  }

  /// Default payload for a path, query string ignored.
  pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    self.entries.get(path)
  }

  /// Synthesize the response served when a path has a configured fallback.
  pub fn synthesize(&self, path: &str) -> Option<StoredResponse> {
    self.lookup(path).map(StoredResponse::json)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> FallbackTable {
    FallbackTable::new(crate::config::EngineConfig::default().offline_fallbacks)
  }

  #[test]
  fn known_paths_synthesize_their_payload() {
    let resp = table().synthesize("/api/wallet/balance").unwrap();
    assert_eq!(
      resp.body_json().unwrap(),
      serde_json::json!({ "coins": 0, "points": 0 })
    );
  }

  #[test]
  fn query_strings_are_ignored() {
    assert!(table().lookup("/api/genres?lang=en").is_some());
  }

  #[test]
  fn unknown_paths_have_no_fallback() {
    assert!(table().lookup("/api/auth/login").is_none());
  }
}
