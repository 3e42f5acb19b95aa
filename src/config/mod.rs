//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`. Endpoints,
//! timeouts and workflow parameters are externalized here - nothing is
//! hardcoded in the usecases layer. Request-signing credentials come
//! from the environment, never from the file.

pub mod loader;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::domain::money::Money;

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Engine identity and logging.
  pub engine: EngineConfig,
  /// Remote data service.
  pub api: ApiConfig,
  /// Local fallback store and polling.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Bid workflow parameters.
  #[serde(default)]
  pub workflow: WorkflowConfig,
  /// Payment provider endpoints.
  #[serde(default)]
  pub payments: PaymentsConfig,
  /// Best-effort presence lookup.
  #[serde(default)]
  pub presence: PresenceConfig,
  /// Metrics and health probes.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Engine identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Remote data service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Action-addressed endpoint, e.g. `https://host/api/data`.
  pub base_url: String,
  /// Request timeout in milliseconds.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Outbound request quota.
  #[serde(default = "default_max_rps")]
  pub max_requests_per_second: u32,
  /// Retries on 429 / 5xx responses. Transport failures are never retried.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  #[serde(default = "default_retry_delay_ms")]
  pub retry_base_delay_ms: u64,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Path of the local JSON ledger used in fallback mode.
  #[serde(default = "default_fallback_path")]
  pub fallback_path: String,
  /// Snapshot refresh interval (milliseconds).
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      fallback_path: default_fallback_path(),
      poll_interval_ms: default_poll_interval_ms(),
    }
  }
}

/// Bid workflow configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
  /// Minimum raise over the current price once an asset has bids.
  #[serde(default = "default_min_increment")]
  pub min_increment: Decimal,
}

impl WorkflowConfig {
  /// Increment in the form `BidWorkflow::new` takes. Embedders construct
  /// workflows with this value.
  pub fn min_increment(&self) -> Money {
    Money::new(self.min_increment)
  }
}

impl Default for WorkflowConfig {
  fn default() -> Self {
    Self {
      min_increment: default_min_increment(),
    }
  }
}

/// Payment provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
  /// Card network API base.
  #[serde(default = "default_card_api_base")]
  pub card_api_base: String,
}

impl Default for PaymentsConfig {
  fn default() -> Self {
    Self {
      card_api_base: default_card_api_base(),
    }
  }
}

/// Presence (location hint) lookup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
  /// Lookup endpoint returning JSON with `city` / `country_name`.
  #[serde(default = "default_presence_url")]
  pub lookup_url: String,
  /// Hard timeout; the placeholder is used beyond it.
  #[serde(default = "default_presence_timeout_ms")]
  pub timeout_ms: u64,
}

impl Default for PresenceConfig {
  fn default() -> Self {
    Self {
      lookup_url: default_presence_url(),
      timeout_ms: default_presence_timeout_ms(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_timeout_ms() -> u64 {
  8_000
}

fn default_max_rps() -> u32 {
  20
}

fn default_max_retries() -> u32 {
  2
}

fn default_retry_delay_ms() -> u64 {
  200
}

fn default_fallback_path() -> String {
  "data/ledger.json".to_string()
}

fn default_poll_interval_ms() -> u64 {
  5_000
}

fn default_min_increment() -> Decimal {
  dec!(1.00)
}

fn default_card_api_base() -> String {
  "https://api.stripe.com".to_string()
}

fn default_presence_url() -> String {
  "https://ipapi.co/json/".to_string()
}

fn default_presence_timeout_ms() -> u64 {
  1_500
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
