//! Remote API Request/Response Types
//!
//! Serialization types for the action-addressed data service and the
//! card network REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action used to read the full data snapshot.
pub const SNAPSHOT_ACTION: &str = "snapshot";

/// Action used to reserve a settlement intent.
pub const CREATE_INTENT_ACTION: &str = "create-payment-intent";

/// Action used to verify a manual settlement proof.
pub const VERIFY_SETTLEMENT_ACTION: &str = "verify-payment";

/// Body of a `create-payment-intent` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest<'a> {
  pub user_id: &'a str,
  pub gateway_id: &'a str,
  /// Amount in minor units.
  pub amount: i64,
}

/// Body of a `verify-payment` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySettlementRequest<'a> {
  pub intent_id: &'a str,
  pub proof: &'a str,
}

/// Error body returned by the data service on non-2xx responses,
/// and sometimes alongside a 200.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
  pub error: Option<Value>,
  pub message: Option<String>,
}

impl ApiError {
  /// Message to surface to the user, if the body carried one.
  pub fn text(&self) -> Option<String> {
    self
      .error
      .as_ref()
      .map(crate::ports::payment::error_text)
      .or_else(|| self.message.clone())
  }
}

/// Card network payment intent, as returned by a confirm call.
#[derive(Debug, Clone, Deserialize)]
pub struct CardIntentResponse {
  pub id: Option<String>,
  pub status: Option<String>,
  pub last_payment_error: Option<CardErrorBody>,
  pub error: Option<CardErrorBody>,
}

/// Card network error object.
#[derive(Debug, Clone, Deserialize)]
pub struct CardErrorBody {
  pub message: Option<String>,
  pub code: Option<String>,
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub decline_code: Option<String>,
}

/// Location lookup response.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationResponse {
  pub city: Option<String>,
  pub country_name: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_create_intent_request_serialization() {
    let req = CreateIntentRequest {
      user_id: "u_1",
      gateway_id: "gw_stripe",
      amount: 25_000,
    };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["userId"], "u_1");
    assert_eq!(json["gatewayId"], "gw_stripe");
    assert_eq!(json["amount"], 25_000);
  }

  #[test]
  fn test_api_error_text_prefers_error_field() {
    let body: ApiError = serde_json::from_str(r#"{"error": "Lead not found"}"#).unwrap();
    assert_eq!(body.text().as_deref(), Some("Lead not found"));

    let body: ApiError = serde_json::from_str(r#"{"message": "bad input"}"#).unwrap();
    assert_eq!(body.text().as_deref(), Some("bad input"));
  }

  #[test]
  fn test_card_intent_response_deserialization() {
    let json = r#"{"id": "pi_1", "status": "requires_action"}"#;
    let resp: CardIntentResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.id.as_deref(), Some("pi_1"));
    assert_eq!(resp.status.as_deref(), Some("requires_action"));
  }
}
