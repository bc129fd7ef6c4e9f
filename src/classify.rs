//! Resource classification.
//!
//! Maps a request path to the resource class that selects its caching
//! strategy. Pure lookup over the configured tables; every input resolves to
//! a class, with `Navigation` as the terminal default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::registry::CacheRole;

/// Categorization of a request, used to select a caching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
  StaticAsset,
  Image,
  ApiShortCache,
  ApiLongCache,
  ApiNetworkFirst,
  Navigation,
}

impl ResourceClass {
  pub fn is_api(&self) -> bool {
    matches!(
      self,
      Self::ApiShortCache | Self::ApiLongCache | Self::ApiNetworkFirst
    )
  }

  /// Namespace role entries of this class are stored under.
  /// Navigations share the static namespace with the app shell.
  pub fn role(&self) -> CacheRole {
    match self {
      Self::StaticAsset | Self::Navigation => CacheRole::Static,
      Self::Image => CacheRole::Image,
      Self::ApiShortCache | Self::ApiLongCache | Self::ApiNetworkFirst => CacheRole::Api,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::StaticAsset => "static-asset",
      Self::Image => "image",
      Self::ApiShortCache => "api-short-cache",
      Self::ApiLongCache => "api-long-cache",
      Self::ApiNetworkFirst => "api-network-first",
      Self::Navigation => "navigation",
    }
  }
}

impl std::fmt::Display for ResourceClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Table-driven classifier. Immutable once built.
#[derive(Debug, Clone)]
pub struct Classifier {
  api_prefix: String,
  short_cache_paths: Vec<String>,
  long_cache_paths: Vec<String>,
  network_first_paths: Vec<String>,
  image_extensions: BTreeSet<String>,
  static_extensions: BTreeSet<String>,
}

impl Classifier {
  pub fn new(config: &EngineConfig) -> Self {
    Self {
      api_prefix: config.api_prefix.clone(),
      short_cache_paths: config.short_cache_paths.clone(),
      long_cache_paths: config.long_cache_paths.clone(),
      network_first_paths: config.network_first_paths.clone(),
      image_extensions: config.image_extensions.clone(),
      static_extensions: config.static_extensions.clone(),
    }
  }

  /// Classify a request path. First match wins:
  /// API prefix (short, long, then explicit network-first, defaulting to
  /// network-first), image extension, static extension, navigation.
  ///
  /// Classification is method-independent: a request's method is part of its
  /// cache identity but never changes its class, so only the path is taken.
  pub fn classify(&self, path: &str) -> ResourceClass {
    if path.starts_with(&self.api_prefix) {
      if matches_prefix(&self.short_cache_paths, path) {
        return ResourceClass::ApiShortCache;
      }
      if matches_prefix(&self.long_cache_paths, path) {
        return ResourceClass::ApiLongCache;
      }
      if matches_prefix(&self.network_first_paths, path) {
        return ResourceClass::ApiNetworkFirst;
      }
      // Unmatched API paths take the network-first default.
      return ResourceClass::ApiNetworkFirst;
    }

    if let Some(ext) = extension(path) {
      if self.image_extensions.contains(&ext) {
        return ResourceClass::Image;
      }
      if self.static_extensions.contains(&ext) {
        return ResourceClass::StaticAsset;
      }
    }

    ResourceClass::Navigation
  }
}

fn matches_prefix(prefixes: &[String], path: &str) -> bool {
  prefixes.iter().any(|prefix| path.starts_with(prefix))
}

/// Lowercased extension of the final path segment, ignoring query strings.
fn extension(path: &str) -> Option<String> {
  let trimmed = path.split(['?', '#']).next().unwrap_or_default();
  let segment = trimmed.rsplit('/').next().unwrap_or_default();
  let (stem, ext) = segment.rsplit_once('.')?;
  if stem.is_empty() || ext.is_empty() {
    return None;
  }
  Some(ext.to_lowercase())
}
