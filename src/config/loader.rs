//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::AppConfig;

/// Upper bound for the presence lookup timeout (milliseconds).
const MAX_PRESENCE_TIMEOUT_MS: u64 = 5_000;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    name = %config.engine.name,
    base_url = %config.api.base_url,
    poll_ms = config.persistence.poll_interval_ms,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.engine.name.trim().is_empty(),
    "engine.name must not be empty"
  );

  // API validation
  anyhow::ensure!(
    !config.api.base_url.is_empty(),
    "api.base_url must not be empty"
  );
  anyhow::ensure!(config.api.timeout_ms > 0, "api.timeout_ms must be positive");
  anyhow::ensure!(
    config.api.max_requests_per_second > 0,
    "api.max_requests_per_second must be positive"
  );

  // Persistence validation
  anyhow::ensure!(
    !config.persistence.fallback_path.is_empty(),
    "persistence.fallback_path must not be empty"
  );
  anyhow::ensure!(
    config.persistence.poll_interval_ms > 0,
    "persistence.poll_interval_ms must be positive"
  );

  // Workflow validation
  anyhow::ensure!(
    config.workflow.min_increment >= Decimal::ZERO,
    "workflow.min_increment must not be negative, got {}",
    config.workflow.min_increment
  );

  // Payments / presence validation
  anyhow::ensure!(
    !config.payments.card_api_base.is_empty(),
    "payments.card_api_base must not be empty"
  );
  anyhow::ensure!(
    config.presence.timeout_ms > 0 && config.presence.timeout_ms <= MAX_PRESENCE_TIMEOUT_MS,
    "presence.timeout_ms must be in (0, {MAX_PRESENCE_TIMEOUT_MS}], got {}",
    config.presence.timeout_ms
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  const MINIMAL: &str = r#"
    [engine]
    name = "lead-exchange"

    [api]
    base_url = "https://example.test/api/data"
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.engine.log_level, "info");
    assert_eq!(config.workflow.min_increment, dec!(1.00));
    assert_eq!(config.workflow.min_increment().to_string(), "1.00");
    assert_eq!(config.persistence.poll_interval_ms, 5_000);
    assert_eq!(config.presence.timeout_ms, 1_500);
  }

  #[test]
  fn test_rejects_slow_presence_timeout() {
    let text = format!("{MINIMAL}\n[presence]\ntimeout_ms = 30000\n");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_increment_rounds_to_minor_units() {
    let text = format!("{MINIMAL}\n[workflow]\nmin_increment = \"0.255\"\n");
    let config = parse_config(&text).unwrap();
    assert_eq!(config.workflow.min_increment().to_minor_units(), Some(26));
  }

  #[test]
  fn test_rejects_negative_increment() {
    let text = format!("{MINIMAL}\n[workflow]\nmin_increment = \"-1\"\n");
    assert!(parse_config(&text).is_err());
  }
}
