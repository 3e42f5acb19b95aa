//! Remote Data Client - Rate-limited Action-addressed HTTP Client
//!
//! Wraps reqwest with rate limiting, request signing and bounded retries
//! for every call to the remote data service. Each call is a POST to
//! `{base_url}?action={action}` with a JSON body.
//!
//! Failure classification is what drives the persistence fallback:
//! - send failure (connect, DNS, timeout) → `Transport`, never retried
//! - 404 → `NotFound` ("no backend deployed")
//! - 429 / 5xx → retried, then `RemoteProtocol`
//! - any other non-2xx → `RemoteProtocol` with the body's message
//! - 2xx whose body carries an `error` → `Rejected`

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::auth::RequestSigner;
use super::types::{ApiError, SNAPSHOT_ACTION};
use crate::config::ApiConfig;
use crate::domain::marketplace::MarketSnapshot;
use crate::ports::persistence::{PersistenceError, RemoteBackend};

/// Configuration for the remote data client.
#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
  /// Action-addressed endpoint.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Outbound request quota.
  pub max_requests_per_second: u32,
  /// Maximum retries on 429 / 5xx.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
}

impl Default for RemoteClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:3000/api/data".to_string(),
      timeout: Duration::from_secs(8),
      max_requests_per_second: 20,
      max_retries: 2,
      retry_base_delay: Duration::from_millis(200),
    }
  }
}

impl From<&ApiConfig> for RemoteClientConfig {
  fn from(api: &ApiConfig) -> Self {
    Self {
      base_url: api.base_url.clone(),
      timeout: Duration::from_millis(api.timeout_ms),
      max_requests_per_second: api.max_requests_per_second,
      max_retries: api.max_retries,
      retry_base_delay: Duration::from_millis(api.retry_base_delay_ms),
    }
  }
}

/// Rate-limited HTTP client for the remote data service.
pub struct RemoteClient {
  /// Underlying HTTP client.
  http: Client,
  /// Optional request signer.
  signer: Option<Arc<RequestSigner>>,
  /// Client configuration.
  config: RemoteClientConfig,
  /// Outbound rate limiter.
  limiter: DefaultDirectRateLimiter,
}

impl RemoteClient {
  /// Create a new remote client.
  pub fn new(signer: Option<Arc<RequestSigner>>, config: RemoteClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let quota = NonZeroU32::new(config.max_requests_per_second).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(quota));

    Ok(Self {
      http,
      signer,
      config,
      limiter,
    })
  }

  /// Base URL this client talks to.
  pub fn base_url(&self) -> &str {
    &self.config.base_url
  }

  /// POST an action with a JSON body and return the JSON response.
  #[instrument(skip(self, payload), fields(action = %action))]
  pub async fn post_action(&self, action: &str, payload: &Value) -> Result<Value, PersistenceError> {
    let body = serde_json::to_string(payload)?;
    let text = self.execute_with_retry(action, body).await?;

    if text.trim().is_empty() {
      return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(&text)?;

    if let Some(message) = embedded_error(&value) {
      debug!(%message, "Backend rejected action");
      return Err(PersistenceError::Rejected(message));
    }
    Ok(value)
  }

  /// Send with signing, rate limiting and retries; returns the body text.
  async fn execute_with_retry(&self, action: &str, body: String) -> Result<String, PersistenceError> {
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(attempt, delay_ms = delay.as_millis(), "Retrying request");
        sleep(delay).await;
      }

      self.limiter.until_ready().await;

      let mut req = self
        .http
        .post(&self.config.base_url)
        .query(&[("action", action)])
        .header(CONTENT_TYPE, "application/json")
        .body(body.clone());

      if let Some(signer) = &self.signer {
        for (name, value) in signer.headers(action, &body) {
          req = req.header(name, value);
        }
      }

      let response = match req.send().await {
        Ok(response) => response,
        Err(e) => {
          warn!(error = %e, action, "Remote request failed to send");
          return Err(PersistenceError::Transport(e.to_string()));
        }
      };

      let status = response.status();
      let text = response
        .text()
        .await
        .map_err(|e| PersistenceError::Transport(e.to_string()))?;

      match status {
        s if s.is_success() => return Ok(text),
        StatusCode::NOT_FOUND => {
          return Err(PersistenceError::NotFound(format!(
            "{} ({action})",
            self.config.base_url
          )));
        }
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
          warn!(status = %s, action, "Transient backend error, retrying");
          last_error = Some(protocol_error(s, &text));
        }
        s => return Err(protocol_error(s, &text)),
      }
    }

    Err(last_error.unwrap_or_else(|| PersistenceError::RemoteProtocol {
      status: 0,
      message: "Max retries exceeded".to_string(),
    }))
  }
}

#[async_trait]
impl RemoteBackend for RemoteClient {
  async fn call(&self, action: &str, payload: &Value) -> Result<Value, PersistenceError> {
    self.post_action(action, payload).await
  }

  async fn fetch_snapshot(&self) -> Result<MarketSnapshot, PersistenceError> {
    let value = self.post_action(SNAPSHOT_ACTION, &Value::Object(Default::default())).await?;
    Ok(serde_json::from_value(value)?)
  }
}

/// Build a protocol error, preferring the body's own message.
fn protocol_error(status: StatusCode, text: &str) -> PersistenceError {
  let message = serde_json::from_str::<ApiError>(text)
    .ok()
    .and_then(|body| body.text())
    .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
    .unwrap_or_else(|| status.to_string());

  PersistenceError::RemoteProtocol {
    status: status.as_u16(),
    message,
  }
}

/// An `error` field on an otherwise successful response.
fn embedded_error(value: &Value) -> Option<String> {
  match value.get("error") {
    None | Some(Value::Null) => None,
    Some(Value::Bool(false)) => None,
    Some(err) => Some(crate::ports::payment::error_text(err)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_protocol_error_uses_body_message() {
    let err = protocol_error(StatusCode::CONFLICT, r#"{"error": "Lead already sold"}"#);
    assert_eq!(err.to_string(), "Lead already sold");

    let err = protocol_error(StatusCode::BAD_REQUEST, "plain text failure");
    assert_eq!(err.to_string(), "plain text failure");

    let err = protocol_error(StatusCode::BAD_GATEWAY, "");
    assert!(matches!(err, PersistenceError::RemoteProtocol { status: 502, .. }));
  }

  #[test]
  fn test_embedded_error_detection() {
    assert_eq!(
      embedded_error(&serde_json::json!({ "error": "Insufficient vault balance" })).as_deref(),
      Some("Insufficient vault balance")
    );
    assert!(embedded_error(&serde_json::json!({ "success": true, "error": null })).is_none());
    assert!(embedded_error(&serde_json::json!({ "error": false })).is_none());
  }
}
