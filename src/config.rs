//! Engine configuration.
//!
//! Everything the engine varies on is data here: the version string that
//! derives the cache generation, the classifier tables, the precache
//! manifest, the offline fallback table and the sync queue identifiers.
//! Passed in at construction so multiple independently-configured engines
//! can coexist (notably in tests).

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Sole input deriving the three namespace names. Bumping it forces a full
  /// generation eviction on next activation.
  pub version: String,

  /// Prefix identifying API requests.
  pub api_prefix: String,

  /// API path prefixes served cache-first (volatile but tolerant of staleness).
  pub short_cache_paths: Vec<String>,
  /// API path prefixes served cache-first (slow-changing catalog data).
  pub long_cache_paths: Vec<String>,
  /// API path prefixes that must always try the network first.
  pub network_first_paths: Vec<String>,

  /// Extensions classified as images.
  pub image_extensions: BTreeSet<String>,
  /// Extensions classified as static assets (script, style, font).
  pub static_extensions: BTreeSet<String>,

  /// Resources primed into the static namespace during install.
  pub precache_manifest: Vec<String>,
  /// Path of the single-page-application shell document.
  pub shell_path: String,

  /// Default payloads returned when cache and network both fail for an API path.
  pub offline_fallbacks: BTreeMap<String, serde_json::Value>,

  /// Tag the host fires to trigger a replay of queued offline actions.
  pub sync_tag: String,
  /// Reserved identity in the api namespace holding the offline-action queue.
  pub queue_key: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      version: "v2.0.0".to_string(),
      api_prefix: "/api/".to_string(),
      short_cache_paths: strings(&[
        "/api/sections/trending",
        "/api/sections/new",
        "/api/sections/popular",
        "/api/search",
      ]),
      long_cache_paths: strings(&["/api/manga", "/api/genres", "/api/ranks"]),
      network_first_paths: strings(&[
        "/api/auth/login",
        "/api/auth/signup",
        "/api/auth/logout",
        "/api/wallet",
        "/api/payments",
        "/api/subscriptions",
      ]),
      image_extensions: string_set(&["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"]),
      static_extensions: string_set(&["js", "css", "woff", "woff2", "ttf", "otf", "map"]),
      precache_manifest: strings(&[
        "/",
        "/manifest.json",
        "/images/placeholder.png",
        "/offline.html",
      ]),
      shell_path: "/".to_string(),
      offline_fallbacks: default_fallbacks(),
      sync_tag: "inkcache-replay".to_string(),
      queue_key: "offline-actions".to_string(),
    }
  }
}

fn strings(values: &[&str]) -> Vec<String> {
  values.iter().map(|s| s.to_string()).collect()
}

fn string_set(values: &[&str]) -> BTreeSet<String> {
  values.iter().map(|s| s.to_string()).collect()
}

fn default_fallbacks() -> BTreeMap<String, serde_json::Value> {
  let mut table = BTreeMap::new();
  table.insert("/api/sections/trending".to_string(), serde_json::json!([]));
  table.insert("/api/genres".to_string(), serde_json::json!([]));
  table.insert("/api/user/library".to_string(), serde_json::json!([]));
  table.insert(
    "/api/wallet/balance".to_string(),
    serde_json::json!({ "coins": 0, "points": 0 }),
  );
  table
}

impl EngineConfig {
  /// Load configuration from file, falling back to defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (an error if missing)
  /// 2. ./inkcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/inkcache/config.yaml
  /// 4. Built-in defaults
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("inkcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("inkcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: EngineConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_cover_the_manga_client() {
    let config = EngineConfig::default();
    assert!(config
      .short_cache_paths
      .iter()
      .any(|p| p.contains("trending")));
    assert!(config.network_first_paths.iter().any(|p| p.contains("auth")));
    assert!(config.offline_fallbacks.contains_key("/api/wallet/balance"));
    assert_eq!(config.precache_manifest.len(), 4);
  }

  #[test]
  fn partial_yaml_fills_in_defaults() {
    let config: EngineConfig = serde_yaml::from_str("version: v3.1.0\n").unwrap();
    assert_eq!(config.version, "v3.1.0");
    assert_eq!(config.api_prefix, "/api/");
    assert!(!config.precache_manifest.is_empty());
  }
}
