//! Payment Port - Provider-agnostic Settlement Interface
//!
//! Three traits meet here:
//! - `SettlementBackend`: the remote side that reserves intents and
//!   verifies manual proofs
//! - `CardNetwork`: a card network's client library, confirming an
//!   intent with a client-held payment instrument
//! - `PaymentGateway`: the settlement contract the workflows consume
//!   (validate → create intent → execute)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::marketplace::GatewayConfig;
use crate::domain::money::Money;
use crate::domain::settlement::{SettlementIntent, SettlementProof, SettlementReceipt};

/// Errors from the payment layer. Provider text displays verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
  /// The gateway is not active.
  #[error("{0}")]
  NodeOffline(String),
  /// The gateway has no public credential configured.
  #[error("{0}")]
  MissingCredentials(String),
  /// The intent could not be created, or was reported invalid/expired.
  /// A held intent must be discarded.
  #[error("{0}")]
  IntentRejected(String),
  /// The card network declined or needs further authentication.
  /// The same intent may be retried.
  #[error("{0}")]
  SettlementDeclined(String),
  /// A manual proof did not verify. The same intent may be retried.
  #[error("{0}")]
  VerificationFailed(String),
}

impl PaymentError {
  /// Whether the held intent must be thrown away and re-created.
  pub fn invalidates_intent(&self) -> bool {
    matches!(self, Self::IntentRejected(_))
  }
}

/// `create intent` wire response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
  pub intent_id: Option<String>,
  pub client_secret: Option<String>,
  /// Error payload, either a string or a structured object.
  pub error: Option<Value>,
}

/// `verify settlement` wire response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
  #[serde(default)]
  pub verified: bool,
  /// Set when the intent itself is invalid or expired.
  pub error: Option<Value>,
}

/// Extract a human-readable message from a string or structured error.
pub fn error_text(error: &Value) -> String {
  match error {
    Value::String(s) => s.clone(),
    Value::Object(map) => map
      .get("message")
      .and_then(Value::as_str)
      .map_or_else(|| error.to_string(), str::to_string),
    other => other.to_string(),
  }
}

/// Successful card confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardConfirmation {
  /// Network transaction id, used in the settlement reference.
  pub transaction_id: String,
}

/// Card network failure, already reduced to one message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardFailure {
  #[error("{0}")]
  Declined(String),
  /// 3-D Secure or another customer action is required.
  #[error("{0}")]
  ActionRequired(String),
  /// The network no longer recognises the intent.
  #[error("{0}")]
  IntentInvalid(String),
  #[error("{0}")]
  Unavailable(String),
}

/// Remote side of settlement: intent reservation and proof verification.
#[async_trait]
pub trait SettlementBackend: Send + Sync + 'static {
  /// Reserve a settlement context for `amount_minor` at `gateway_id`.
  async fn create_intent(
    &self,
    user_id: &str,
    gateway_id: &str,
    amount_minor: i64,
  ) -> Result<IntentResponse, PaymentError>;

  /// Verify an out-of-band proof token against an intent.
  async fn verify_settlement(
    &self,
    intent_id: &str,
    proof: &str,
  ) -> Result<VerifyResponse, PaymentError>;
}

/// A card network's client library.
#[async_trait]
pub trait CardNetwork: Send + Sync + 'static {
  /// Exchange a payment instrument for a confirmation of the intent
  /// identified by `client_secret`.
  async fn confirm(
    &self,
    publishable_key: &str,
    client_secret: &str,
    payment_method: &str,
  ) -> Result<CardConfirmation, CardFailure>;
}

/// The settlement contract consumed by the bid and funding workflows.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
  /// Fail fast if the gateway is offline or not minimally configured.
  fn validate(&self, gateway: &GatewayConfig) -> Result<(), PaymentError>;

  /// Reserve a settlement intent crediting `amount` (net of fees).
  async fn create_intent(
    &self,
    user_id: &str,
    gateway: &GatewayConfig,
    amount: Money,
  ) -> Result<SettlementIntent, PaymentError>;

  /// Settle `intent` with a card instrument or a manual proof.
  ///
  /// Never creates a new intent; retrying with the same intent after a
  /// decline is allowed unless the error invalidates it.
  async fn execute(
    &self,
    gateway: &GatewayConfig,
    intent: &SettlementIntent,
    proof: &SettlementProof,
  ) -> Result<SettlementReceipt, PaymentError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_text_variants() {
    assert_eq!(error_text(&serde_json::json!("card expired")), "card expired");
    assert_eq!(
      error_text(&serde_json::json!({ "message": "amount too small", "code": 7 })),
      "amount too small"
    );
    assert_eq!(error_text(&serde_json::json!({ "code": 7 })), r#"{"code":7}"#);
  }

  #[test]
  fn test_intent_response_tolerates_structured_error() {
    let resp: IntentResponse =
      serde_json::from_str(r#"{"error": {"message": "gateway disabled"}}"#).unwrap();
    assert!(resp.intent_id.is_none());
    assert_eq!(error_text(resp.error.as_ref().unwrap()), "gateway disabled");
  }
}
