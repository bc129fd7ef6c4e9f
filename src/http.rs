//! Request/response types and the network transport seam.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// An inbound request intercepted by the engine.
///
/// The URL may be absolute or a bare path; cache identities use it as given,
/// classification and fallback lookup use only the path portion.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_uppercase(),
      url: url.to_string(),
      headers: Vec::new(),
      body: None,
    }
  }

  /// Convenience constructor for the common case.
  pub fn get(url: &str) -> Self {
    Self::new("GET", url)
  }

  /// Cache identity: method plus URL as given.
  pub fn identity(&self) -> String {
    format!("{} {}", self.method, self.url)
  }

  /// Path portion of the URL, with query string and fragment stripped.
  pub fn path(&self) -> String {
    if let Ok(parsed) = Url::parse(&self.url) {
      return parsed.path().to_string();
    }
    self
      .url
      .split(['?', '#'])
      .next()
      .unwrap_or_default()
      .to_string()
  }
}

/// A response in storable form: status, headers and body bytes.
///
/// This is both what the cache persists and what the engine hands back to
/// callers; responses served from cache are copies of the stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl StoredResponse {
  /// Whether the status is in the 2xx range. Only ok responses are cached.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Synthesize a 200 JSON response from a payload.
  pub fn json(payload: &serde_json::Value) -> Self {
    Self {
      status: 200,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: payload.to_string().into_bytes(),
    }
  }

  /// Synthesize a 200 HTML response.
  pub fn html(document: &str) -> Self {
    Self {
      status: 200,
      headers: vec![(
        "content-type".to_string(),
        "text/html; charset=utf-8".to_string(),
      )],
      body: document.as_bytes().to_vec(),
    }
  }

  /// Look up a header value by case-insensitive name.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Parse the body as JSON.
  pub fn body_json(&self) -> Result<serde_json::Value> {
    serde_json::from_slice(&self.body).map_err(|e| eyre!("Failed to parse response body: {}", e))
  }
}

/// Network transport the engine fetches through.
///
/// Object-safe so the engine can clone one `Arc<dyn Transport>` into detached
/// refresh tasks; tests inject a scriptable implementation.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &Request) -> Result<StoredResponse>;
}

/// Production transport backed by reqwest.
pub struct HttpTransport {
  client: reqwest::Client,
  /// Origin joined onto bare-path request URLs.
  origin: Option<Url>,
}

impl HttpTransport {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
      origin: None,
    }
  }

  /// Transport that resolves bare paths against the given origin.
  pub fn with_origin(origin: &str) -> Result<Self> {
    let origin = Url::parse(origin).map_err(|e| eyre!("Invalid origin {}: {}", origin, e))?;
    Ok(Self {
      client: reqwest::Client::new(),
      origin: Some(origin),
    })
  }

  fn resolve(&self, url: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(url) {
      return Ok(absolute);
    }
    match &self.origin {
      Some(origin) => origin
        .join(url)
        .map_err(|e| eyre!("Cannot resolve {} against {}: {}", url, origin, e)),
      None => Err(eyre!("Relative URL {} with no origin configured", url)),
    }
  }
}

impl Default for HttpTransport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn send(&self, request: &Request) -> Result<StoredResponse> {
    let url = self.resolve(&request.url)?;
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
      .to_vec();

    Ok(StoredResponse {
      status,
      headers,
      body,
    })
  }
}
