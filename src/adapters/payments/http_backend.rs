//! Settlement backend over the remote data service.
//!
//! Intent reservation and manual-proof verification are two more
//! actions on the same action-addressed endpoint the persistence
//! gateway uses, so this adapter shares its `RemoteClient`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::adapters::api::types::{
  CreateIntentRequest, VerifySettlementRequest, CREATE_INTENT_ACTION, VERIFY_SETTLEMENT_ACTION,
};
use crate::adapters::api::RemoteClient;
use crate::ports::payment::{IntentResponse, PaymentError, SettlementBackend, VerifyResponse};
use crate::ports::persistence::PersistenceError;

/// `SettlementBackend` backed by the remote data service.
pub struct HttpSettlementBackend {
  client: Arc<RemoteClient>,
}

impl HttpSettlementBackend {
  pub fn new(client: Arc<RemoteClient>) -> Self {
    Self { client }
  }
}

#[async_trait]
impl SettlementBackend for HttpSettlementBackend {
  #[instrument(skip(self), fields(action = CREATE_INTENT_ACTION))]
  async fn create_intent(
    &self,
    user_id: &str,
    gateway_id: &str,
    amount_minor: i64,
  ) -> Result<IntentResponse, PaymentError> {
    let body = serde_json::to_value(CreateIntentRequest {
      user_id,
      gateway_id,
      amount: amount_minor,
    })
    .map_err(|e| PaymentError::IntentRejected(e.to_string()))?;

    let value = self
      .client
      .post_action(CREATE_INTENT_ACTION, &body)
      .await
      .map_err(|e| PaymentError::IntentRejected(e.to_string()))?;

    serde_json::from_value(value).map_err(|e| PaymentError::IntentRejected(e.to_string()))
  }

  #[instrument(skip(self, proof), fields(action = VERIFY_SETTLEMENT_ACTION))]
  async fn verify_settlement(
    &self,
    intent_id: &str,
    proof: &str,
  ) -> Result<VerifyResponse, PaymentError> {
    let body = serde_json::to_value(VerifySettlementRequest { intent_id, proof })
      .map_err(|e| PaymentError::VerificationFailed(e.to_string()))?;

    let value = match self.client.post_action(VERIFY_SETTLEMENT_ACTION, &body).await {
      Ok(value) => value,
      // The backend answers with an `error` only when the intent itself
      // is unknown or expired.
      Err(PersistenceError::Rejected(message)) => {
        return Err(PaymentError::IntentRejected(message));
      }
      Err(e) => return Err(PaymentError::VerificationFailed(e.to_string())),
    };

    serde_json::from_value(value).map_err(|e| PaymentError::VerificationFailed(e.to_string()))
  }
}
