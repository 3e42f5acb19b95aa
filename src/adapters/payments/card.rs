//! Card Network Client - Payment Intent Confirmation
//!
//! Confirms a backend-created payment intent with a client-held payment
//! method, authenticating with the gateway's publishable key and the
//! intent's client secret (the same call a browser SDK makes).
//!
//! Outcome mapping:
//! - `succeeded` / `processing` / `requires_capture` → confirmed
//! - `requires_action` → customer authentication needed
//! - `requires_payment_method` or a `card_error` → declined
//! - unknown or unexpected-state intent, or `canceled` → intent invalid

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::adapters::api::types::{CardErrorBody, CardIntentResponse};
use crate::ports::payment::{CardConfirmation, CardFailure, CardNetwork};

/// Separator between the intent id and the secret part of a client secret.
const SECRET_SEPARATOR: &str = "_secret_";

/// Error codes meaning the intent can no longer be confirmed.
const INVALID_INTENT_CODES: [&str; 2] = ["resource_missing", "payment_intent_unexpected_state"];

/// HTTP client for the card network's intent confirmation endpoint.
pub struct StripeCardNetwork {
    http: Client,
    api_base: String,
}

impl StripeCardNetwork {
    /// Create a client against `api_base` (e.g. `https://api.stripe.com`).
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build card network HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

/// The intent id embedded in a client secret (`pi_123_secret_abc` → `pi_123`).
fn intent_id_from_secret(client_secret: &str) -> Option<&str> {
    client_secret
        .split_once(SECRET_SEPARATOR)
        .map(|(id, _)| id)
        .filter(|id| !id.is_empty())
}

fn classify_error(body: &CardErrorBody) -> CardFailure {
    let message = body
        .message
        .clone()
        .unwrap_or_else(|| "Card payment failed".to_string());

    if body
        .code
        .as_deref()
        .is_some_and(|code| INVALID_INTENT_CODES.contains(&code))
    {
        CardFailure::IntentInvalid(message)
    } else if body.kind.as_deref() == Some("card_error") {
        CardFailure::Declined(message)
    } else {
        CardFailure::Unavailable(message)
    }
}

fn classify_status(resp: CardIntentResponse, fallback_id: &str) -> Result<CardConfirmation, CardFailure> {
    let status = resp.status.as_deref().unwrap_or_default();
    match status {
        "succeeded" | "processing" | "requires_capture" => Ok(CardConfirmation {
            transaction_id: resp.id.unwrap_or_else(|| fallback_id.to_string()),
        }),
        "requires_action" => Err(CardFailure::ActionRequired(
            "Additional authentication is required for this card".to_string(),
        )),
        "requires_payment_method" => Err(CardFailure::Declined(
            resp.last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Your card was declined".to_string()),
        )),
        "canceled" => Err(CardFailure::IntentInvalid(
            "This payment was canceled".to_string(),
        )),
        other => Err(CardFailure::Unavailable(format!(
            "Unexpected payment status: {other}"
        ))),
    }
}

#[async_trait]
impl CardNetwork for StripeCardNetwork {
    #[instrument(skip_all)]
    async fn confirm(
        &self,
        publishable_key: &str,
        client_secret: &str,
        payment_method: &str,
    ) -> Result<CardConfirmation, CardFailure> {
        let intent_id = intent_id_from_secret(client_secret)
            .ok_or_else(|| CardFailure::IntentInvalid("Malformed payment intent secret".to_string()))?;

        let url = format!("{}/v1/payment_intents/{intent_id}/confirm", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(publishable_key)
            .form(&[
                ("client_secret", client_secret),
                ("payment_method", payment_method),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Card network unreachable");
                CardFailure::Unavailable(e.to_string())
            })?;

        let status = response.status();
        let body: CardIntentResponse = response
            .json()
            .await
            .map_err(|e| CardFailure::Unavailable(e.to_string()))?;

        if let Some(error) = body.error.as_ref() {
            debug!(%status, code = ?error.code, "Card confirmation refused");
            return Err(classify_error(error));
        }
        if !status.is_success() {
            return Err(CardFailure::Unavailable(status.to_string()));
        }

        classify_status(body, intent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const SECRET: &str = "pi_123_secret_abc";

    fn network(server: &MockServer) -> StripeCardNetwork {
        StripeCardNetwork::new(server.base_url(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_intent_id_from_secret() {
        assert_eq!(intent_id_from_secret(SECRET), Some("pi_123"));
        assert_eq!(intent_id_from_secret("garbage"), None);
        assert_eq!(intent_id_from_secret("_secret_x"), None);
    }

    #[tokio::test]
    async fn test_confirm_succeeded() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/payment_intents/pi_123/confirm")
                    .header("authorization", "Bearer pk_test_1")
                    .body_contains("payment_method=pm_card_visa");
                then.status(200)
                    .json_body(serde_json::json!({ "id": "pi_123", "status": "succeeded" }));
            })
            .await;

        let ok = network(&server)
            .confirm("pk_test_1", SECRET, "pm_card_visa")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(ok.transaction_id, "pi_123");
    }

    #[tokio::test]
    async fn test_confirm_requires_action() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(serde_json::json!({ "id": "pi_123", "status": "requires_action" }));
            })
            .await;

        let err = network(&server).confirm("pk", SECRET, "pm").await.unwrap_err();
        assert!(matches!(err, CardFailure::ActionRequired(_)));
    }

    #[tokio::test]
    async fn test_card_error_is_decline() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(402).json_body(serde_json::json!({
                    "error": {
                        "type": "card_error",
                        "code": "card_declined",
                        "decline_code": "insufficient_funds",
                        "message": "Your card has insufficient funds."
                    }
                }));
            })
            .await;

        let err = network(&server).confirm("pk", SECRET, "pm").await.unwrap_err();
        assert_eq!(
            err,
            CardFailure::Declined("Your card has insufficient funds.".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_intent_is_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(404).json_body(serde_json::json!({
                    "error": {
                        "type": "invalid_request_error",
                        "code": "resource_missing",
                        "message": "No such payment_intent: 'pi_123'"
                    }
                }));
            })
            .await;

        let err = network(&server).confirm("pk", SECRET, "pm").await.unwrap_err();
        assert!(matches!(err, CardFailure::IntentInvalid(_)));
    }
}
