//! Presence Lookup - Best-effort Location Hint
//!
//! Resolves a rough "City, Country" hint for audit and presence display.
//! Bounded by a hard timeout; any failure yields the placeholder so the
//! caller never waits on it.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::time::timeout;
use tracing::debug;

use crate::adapters::api::types::LocationResponse;
use crate::config::PresenceConfig;

/// Value used whenever the location cannot be resolved in time.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Location hint resolver.
pub struct PresenceLocator {
  http: Client,
  lookup_url: String,
  timeout: Duration,
}

impl PresenceLocator {
  pub fn new(config: &PresenceConfig) -> Result<Self> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build presence HTTP client")?;
    Ok(Self {
      http,
      lookup_url: config.lookup_url.clone(),
      timeout,
    })
  }

  /// Resolve the location hint, or `UNKNOWN_LOCATION`.
  pub async fn resolve(&self) -> String {
    match timeout(self.timeout, self.fetch()).await {
      Ok(Some(location)) => location,
      Ok(None) => UNKNOWN_LOCATION.to_string(),
      Err(_) => {
        debug!(timeout_ms = self.timeout.as_millis(), "Presence lookup timed out");
        UNKNOWN_LOCATION.to_string()
      }
    }
  }

  async fn fetch(&self) -> Option<String> {
    let resp = self.http.get(&self.lookup_url).send().await.ok()?;
    let body: LocationResponse = resp.error_for_status().ok()?.json().await.ok()?;
    match (body.city, body.country_name) {
      (Some(city), Some(country)) => Some(format!("{city}, {country}")),
      (None, Some(country)) => Some(country),
      (Some(city), None) => Some(city),
      (None, None) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::prelude::*;

  fn locator(url: String, timeout_ms: u64) -> PresenceLocator {
    PresenceLocator::new(&PresenceConfig {
      lookup_url: url,
      timeout_ms,
    })
    .unwrap()
  }

  #[tokio::test]
  async fn test_locate_formats_city_and_country() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/json/");
        then
          .status(200)
          .json_body(serde_json::json!({ "city": "Austin", "country_name": "United States" }));
      })
      .await;

    let hint = locator(server.url("/json/"), 1_000).resolve().await;
    assert_eq!(hint, "Austin, United States");
  }

  #[tokio::test]
  async fn test_slow_lookup_degrades_to_placeholder() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET);
        then
          .status(200)
          .delay(Duration::from_millis(500))
          .json_body(serde_json::json!({ "city": "Late" }));
      })
      .await;

    let hint = locator(server.url("/json/"), 50).resolve().await;
    assert_eq!(hint, UNKNOWN_LOCATION);
  }

  #[tokio::test]
  async fn test_unreachable_lookup_degrades_to_placeholder() {
    let hint = locator("http://127.0.0.1:9/json/".to_string(), 200).resolve().await;
    assert_eq!(hint, UNKNOWN_LOCATION);
  }
}
