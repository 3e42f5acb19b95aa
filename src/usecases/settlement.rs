//! Settlement Engine - Payment Gateway Contract
//!
//! Implements validate → create intent → execute over two channels:
//! - Card: the backend reserves an intent and hands back a client
//!   secret; the card network confirms it with the payer's instrument
//! - Manual (QR, crypto, bank): the backend reserves an intent and later
//!   verifies an out-of-band proof token against it
//!
//! Either way a success yields one `{PROVIDER}_SETTLE_{id}` reference.
//! `execute` never creates an intent, so a declined attempt can be
//! retried on the same intent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::domain::marketplace::GatewayConfig;
use crate::domain::money::Money;
use crate::domain::settlement::{
  charged_amount, IntentState, SettlementChannel, SettlementIntent, SettlementProof,
  SettlementReceipt, SettlementRef,
};
use crate::ports::payment::{
  error_text, CardFailure, CardNetwork, PaymentError, PaymentGateway, SettlementBackend,
};

/// Provider-agnostic settlement over a backend and a card network.
pub struct SettlementEngine<B: SettlementBackend, N: CardNetwork> {
  backend: Arc<B>,
  card: Arc<N>,
}

impl<B: SettlementBackend, N: CardNetwork> SettlementEngine<B, N> {
  pub fn new(backend: Arc<B>, card: Arc<N>) -> Self {
    Self { backend, card }
  }

  async fn settle_card(
    &self,
    gateway: &GatewayConfig,
    intent: &SettlementIntent,
    payment_method: &str,
  ) -> Result<SettlementRef, PaymentError> {
    let secret = intent
      .client_secret
      .as_deref()
      .ok_or_else(|| PaymentError::IntentRejected("Payment session is missing its secret".into()))?;

    let confirmation = self
      .card
      .confirm(&gateway.public_key, secret, payment_method)
      .await
      .map_err(card_failure)?;

    Ok(SettlementRef::new(&intent.provider, &confirmation.transaction_id))
  }

  async fn settle_manual(
    &self,
    intent: &SettlementIntent,
    token: &str,
  ) -> Result<SettlementRef, PaymentError> {
    if token.trim().is_empty() {
      return Err(PaymentError::VerificationFailed(
        "A payment proof is required".to_string(),
      ));
    }

    let resp = self.backend.verify_settlement(&intent.intent_id, token.trim()).await?;
    if let Some(err) = resp.error.as_ref() {
      return Err(PaymentError::IntentRejected(error_text(err)));
    }
    if !resp.verified {
      return Err(PaymentError::VerificationFailed(
        "Payment could not be verified yet".to_string(),
      ));
    }

    Ok(SettlementRef::random(&intent.provider))
  }
}

/// Reduce a card network failure to the settlement error taxonomy.
fn card_failure(failure: CardFailure) -> PaymentError {
  match failure {
    CardFailure::IntentInvalid(msg) => PaymentError::IntentRejected(msg),
    CardFailure::Declined(msg) | CardFailure::ActionRequired(msg) | CardFailure::Unavailable(msg) => {
      PaymentError::SettlementDeclined(msg)
    }
  }
}

/// Record the outcome of one `execute` attempt on the held intent.
pub fn record_attempt(intent: &mut SettlementIntent, outcome: &Result<SettlementReceipt, PaymentError>) {
  intent.attempts += 1;
  intent.state = match outcome {
    Ok(_) => IntentState::Confirmed,
    Err(e) if e.invalidates_intent() => IntentState::Invalidated,
    Err(_) => IntentState::Declined,
  };
}

#[async_trait]
impl<B: SettlementBackend, N: CardNetwork> PaymentGateway for SettlementEngine<B, N> {
  fn validate(&self, gateway: &GatewayConfig) -> Result<(), PaymentError> {
    if !gateway.is_active() {
      return Err(PaymentError::NodeOffline(format!(
        "{} is currently offline",
        gateway.name
      )));
    }
    if gateway.public_key.trim().is_empty() {
      return Err(PaymentError::MissingCredentials(format!(
        "{} is not configured",
        gateway.name
      )));
    }
    Ok(())
  }

  #[instrument(skip(self, gateway), fields(gateway = %gateway.id, amount = %amount))]
  async fn create_intent(
    &self,
    user_id: &str,
    gateway: &GatewayConfig,
    amount: Money,
  ) -> Result<SettlementIntent, PaymentError> {
    self.validate(gateway)?;
    if !amount.is_positive() {
      return Err(PaymentError::IntentRejected(
        "Amount must be greater than zero".to_string(),
      ));
    }

    let out_of_range = || PaymentError::IntentRejected("Amount is out of range".to_string());
    let charged = charged_amount(amount, gateway).ok_or_else(out_of_range)?;
    let amount_minor = charged.to_minor_units().ok_or_else(out_of_range)?;

    let resp = self
      .backend
      .create_intent(user_id, &gateway.id, amount_minor)
      .await?;

    if let Some(err) = resp.error.as_ref() {
      let message = error_text(err);
      warn!(%message, "Gateway refused to create intent");
      return Err(PaymentError::IntentRejected(message));
    }

    let intent_id = resp
      .intent_id
      .filter(|id| !id.trim().is_empty())
      .ok_or_else(|| PaymentError::IntentRejected("Gateway returned no payment session".to_string()))?;

    let channel = SettlementChannel::for_provider(&gateway.provider);
    if channel == SettlementChannel::Card && resp.client_secret.is_none() {
      return Err(PaymentError::IntentRejected(
        "Card gateway returned no client secret".to_string(),
      ));
    }

    debug!(%intent_id, ?channel, charged = %charged, "Settlement intent created");
    Ok(SettlementIntent {
      intent_id,
      gateway_id: gateway.id.clone(),
      user_id: user_id.to_string(),
      provider: gateway.provider.clone(),
      channel,
      amount,
      charged,
      amount_minor,
      client_secret: resp.client_secret,
      state: IntentState::Created,
      attempts: 0,
    })
  }

  #[instrument(skip_all, fields(gateway = %gateway.id, intent = %intent.intent_id))]
  async fn execute(
    &self,
    gateway: &GatewayConfig,
    intent: &SettlementIntent,
    proof: &SettlementProof,
  ) -> Result<SettlementReceipt, PaymentError> {
    self.validate(gateway)?;
    if intent.gateway_id != gateway.id {
      return Err(PaymentError::IntentRejected(
        "Payment session belongs to a different gateway".to_string(),
      ));
    }
    if !intent.is_usable() {
      return Err(PaymentError::IntentRejected(
        "Payment session has expired, please start again".to_string(),
      ));
    }

    let reference = match (intent.channel, proof) {
      (SettlementChannel::Card, SettlementProof::Card { payment_method }) => {
        self.settle_card(gateway, intent, payment_method).await?
      }
      (SettlementChannel::Manual, SettlementProof::Manual { token }) => {
        self.settle_manual(intent, token).await?
      }
      _ => {
        return Err(PaymentError::VerificationFailed(
          "This payment method does not match the selected gateway".to_string(),
        ));
      }
    };

    info!(reference = %reference, amount = %intent.amount, "Settlement confirmed");
    Ok(SettlementReceipt {
      reference,
      amount: intent.amount,
      gateway_id: gateway.id.clone(),
    })
  }
}
