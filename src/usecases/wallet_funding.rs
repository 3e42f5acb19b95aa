//! Wallet Funding - Direct Vault Deposits
//!
//! The settlement contract entered without an asset:
//! `SelectGateway → PortalOpen → Settling → Settled`.
//! On `Settled` the net amount is credited and the gateway selection is
//! cleared, leaving the flow ready for another deposit.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::bid_workflow::WorkflowError;
use super::settlement::record_attempt;
use crate::domain::marketplace::{Actor, AuditEntry, GatewayConfig, MarketSnapshot};
use crate::domain::money::Money;
use crate::domain::settlement::{SettlementIntent, SettlementProof, SettlementReceipt};
use crate::ports::payment::PaymentGateway;
use crate::ports::persistence::{AdjustmentReason, BalanceAdjustment, LedgerStore, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingStage {
  SelectGateway,
  PortalOpen,
  Settling,
  Settled,
}

impl fmt::Display for FundingStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::SelectGateway => "select-gateway",
      Self::PortalOpen => "portal-open",
      Self::Settling => "settling",
      Self::Settled => "settled",
    })
  }
}

#[derive(Debug, Default)]
struct Portal {
  gateway: Option<GatewayConfig>,
  intent: Option<SettlementIntent>,
  receipt: Option<SettlementReceipt>,
}

#[derive(Debug)]
struct FundingState {
  stage: FundingStage,
  portal: Portal,
  last_error: Option<String>,
  last_credit: Option<SettlementReceipt>,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// Deposit flow for the acting user's vault.
pub struct WalletFunding<L: LedgerStore, P: PaymentGateway> {
  store: Arc<L>,
  payments: Arc<P>,
  snapshots: watch::Receiver<Arc<MarketSnapshot>>,
  actor: Actor,
  busy: AtomicBool,
  state: Mutex<FundingState>,
}

impl<L: LedgerStore, P: PaymentGateway> WalletFunding<L, P> {
  pub fn new(
    store: Arc<L>,
    payments: Arc<P>,
    snapshots: watch::Receiver<Arc<MarketSnapshot>>,
    actor: Actor,
  ) -> Self {
    Self {
      store,
      payments,
      snapshots,
      actor,
      busy: AtomicBool::new(false),
      state: Mutex::new(FundingState {
        stage: FundingStage::SelectGateway,
        portal: Portal::default(),
        last_error: None,
        last_credit: None,
      }),
    }
  }

  pub fn stage(&self) -> FundingStage {
    self.lock().stage
  }

  pub fn selected_gateway(&self) -> Option<GatewayConfig> {
    self.lock().portal.gateway.clone()
  }

  /// The intent held while the portal is open.
  pub fn intent(&self) -> Option<SettlementIntent> {
    self.lock().portal.intent.clone()
  }

  pub fn last_error(&self) -> Option<String> {
    self.lock().last_error.clone()
  }

  /// Receipt of the most recent completed deposit.
  pub fn last_credit(&self) -> Option<SettlementReceipt> {
    self.lock().last_credit.clone()
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  pub fn funding_options(&self) -> Vec<GatewayConfig> {
    self.snapshots.borrow().active_gateways()
  }

  /// Pick a gateway and reserve an intent for `amount` (net of fees).
  #[instrument(skip(self), fields(user = %self.actor.user_id, amount = %amount))]
  pub async fn open_portal(
    &self,
    gateway_id: &str,
    amount: Money,
  ) -> Result<FundingStage, WorkflowError> {
    let Some(_busy) = self.try_busy() else {
      debug!("Open ignored, a call is outstanding");
      return Ok(self.stage());
    };

    let stage = self.stage();
    if !matches!(stage, FundingStage::SelectGateway | FundingStage::Settled) {
      return Err(WorkflowError::InvalidInput(format!(
        "A deposit is already in progress ({stage})"
      )));
    }
    if !amount.is_positive() {
      return Err(self.refuse(WorkflowError::InvalidInput(
        "Deposit amount must be greater than zero".into(),
      )));
    }

    let Some(gateway) = self.funding_options().into_iter().find(|g| g.id == gateway_id) else {
      return Err(self.refuse(WorkflowError::InvalidInput(
        "That gateway is not available".into(),
      )));
    };

    let intent = match self
      .payments
      .create_intent(&self.actor.user_id, &gateway, amount)
      .await
    {
      Ok(intent) => intent,
      Err(e) => return Err(self.refuse(e.into())),
    };

    let mut st = self.lock();
    st.stage = FundingStage::PortalOpen;
    st.portal = Portal {
      gateway: Some(gateway),
      intent: Some(intent),
      receipt: None,
    };
    st.last_error = None;
    Ok(st.stage)
  }

  /// Settle the open portal and credit the vault.
  #[instrument(skip(self, proof), fields(user = %self.actor.user_id))]
  pub async fn settle(&self, proof: SettlementProof) -> Result<FundingStage, WorkflowError> {
    let Some(_busy) = self.try_busy() else {
      debug!("Settle ignored, a call is outstanding");
      return Ok(self.stage());
    };

    let (gateway, intent, held_receipt) = {
      let mut st = self.lock();
      if st.stage != FundingStage::PortalOpen {
        return Err(WorkflowError::InvalidInput("No payment portal is open".into()));
      }
      let (Some(gateway), Some(intent)) = (st.portal.gateway.clone(), st.portal.intent.clone())
      else {
        return Err(WorkflowError::InvalidInput("No payment portal is open".into()));
      };
      st.stage = FundingStage::Settling;
      (gateway, intent, st.portal.receipt.clone())
    };

    let receipt = match held_receipt {
      Some(receipt) => receipt,
      None => self.execute(&gateway, intent, &proof).await?,
    };

    let adjustment = BalanceAdjustment {
      user_id: self.actor.user_id.clone(),
      delta: receipt.amount,
      reference: receipt.reference.to_string(),
      reason: AdjustmentReason::Deposit,
    };
    if let Err(e) = self.store.call(&Operation::AdjustBalance(adjustment)).await {
      let mut st = self.lock();
      st.stage = FundingStage::PortalOpen;
      st.last_error = Some(e.to_string());
      warn!(error = %e, reference = %receipt.reference, "Deposit settled but not credited");
      return Err(e.into());
    }

    info!(reference = %receipt.reference, amount = %receipt.amount, "Deposit credited");
    {
      let mut st = self.lock();
      st.stage = FundingStage::Settled;
      st.portal = Portal::default();
      st.last_error = None;
      st.last_credit = Some(receipt.clone());
    }

    let entry = AuditEntry::new(
      &self.actor.user_id,
      "deposit",
      format!("{} via {}", receipt.amount, receipt.reference),
    );
    if let Err(e) = self.store.call(&Operation::AppendLog(entry)).await {
      warn!(error = %e, "Audit entry not written");
    }
    Ok(FundingStage::Settled)
  }

  /// Close the portal without settling.
  pub fn close_portal(&self) -> Result<FundingStage, WorkflowError> {
    if self.is_busy() {
      return Err(WorkflowError::InvalidInput("A payment is being processed".into()));
    }
    let mut st = self.lock();
    if st.portal.receipt.is_some() {
      return Err(WorkflowError::InvalidInput(
        "Payment already settled, crediting must be retried".into(),
      ));
    }
    st.stage = FundingStage::SelectGateway;
    st.portal = Portal::default();
    st.last_error = None;
    Ok(st.stage)
  }

  async fn execute(
    &self,
    gateway: &GatewayConfig,
    mut intent: SettlementIntent,
    proof: &SettlementProof,
  ) -> Result<SettlementReceipt, WorkflowError> {
    let outcome = self.payments.execute(gateway, &intent, proof).await;
    record_attempt(&mut intent, &outcome);

    let mut st = self.lock();
    match outcome {
      Ok(receipt) => {
        st.portal.intent = Some(intent);
        st.portal.receipt = Some(receipt.clone());
        Ok(receipt)
      }
      Err(e) => {
        if e.invalidates_intent() {
          st.stage = FundingStage::SelectGateway;
          st.portal = Portal::default();
        } else {
          st.stage = FundingStage::PortalOpen;
          st.portal.intent = Some(intent);
        }
        st.last_error = Some(e.to_string());
        Err(e.into())
      }
    }
  }

  /// Keep the current stage and remember the message.
  fn refuse(&self, err: WorkflowError) -> WorkflowError {
    self.lock().last_error = Some(err.to_string());
    err
  }

  fn lock(&self) -> MutexGuard<'_, FundingState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn try_busy(&self) -> Option<BusyGuard<'_>> {
    self
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| BusyGuard(&self.busy))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::persistence::fixtures::{self, BUYER_ID};
  use crate::domain::marketplace::Role;
  use crate::domain::settlement::{IntentState, SettlementChannel, SettlementRef};
  use crate::ports::payment::PaymentError;
  use crate::ports::persistence::{PersistenceError, StoreMode};
  use async_trait::async_trait;
  use mockall::mock;
  use serde_json::Value;

  mock! {
    Store {}

    #[async_trait]
    impl LedgerStore for Store {
      async fn call(&self, op: &Operation) -> Result<Value, PersistenceError>;
      async fn snapshot(&self) -> Result<MarketSnapshot, PersistenceError>;
      fn mode(&self) -> StoreMode;
    }
  }

  mock! {
    Payments {}

    #[async_trait]
    impl PaymentGateway for Payments {
      fn validate(&self, gateway: &GatewayConfig) -> Result<(), PaymentError>;
      async fn create_intent(
        &self,
        user_id: &str,
        gateway: &GatewayConfig,
        amount: Money,
      ) -> Result<SettlementIntent, PaymentError>;
      async fn execute(
        &self,
        gateway: &GatewayConfig,
        intent: &SettlementIntent,
        proof: &SettlementProof,
      ) -> Result<SettlementReceipt, PaymentError>;
    }
  }

  fn intent(gateway: &GatewayConfig, amount: Money) -> SettlementIntent {
    SettlementIntent {
      intent_id: "int_1".into(),
      gateway_id: gateway.id.clone(),
      user_id: BUYER_ID.into(),
      provider: gateway.provider.clone(),
      channel: SettlementChannel::Manual,
      amount,
      charged: amount,
      amount_minor: amount.to_minor_units().unwrap_or_default(),
      client_secret: None,
      state: IntentState::Created,
      attempts: 0,
    }
  }

  fn funding(store: MockStore, payments: MockPayments) -> WalletFunding<MockStore, MockPayments> {
    let (_tx, rx) = watch::channel(Arc::new(fixtures::seed().to_snapshot()));
    WalletFunding::new(
      Arc::new(store),
      Arc::new(payments),
      rx,
      Actor::new(BUYER_ID, Role::User),
    )
  }

  fn manual() -> SettlementProof {
    SettlementProof::Manual { token: "UTR-77".into() }
  }

  #[tokio::test]
  async fn test_second_portal_refused_while_open() {
    let mut payments = MockPayments::new();
    payments
      .expect_create_intent()
      .times(1)
      .returning(|_, gw, amount| Ok(intent(gw, amount)));
    let wallet = funding(MockStore::new(), payments);

    wallet.open_portal("gw_upi", Money::from_major(20)).await.unwrap();
    let err = wallet.open_portal("gw_upi", Money::from_major(20)).await.unwrap_err();
    assert_eq!(err.to_string(), "A deposit is already in progress (portal-open)");

    assert_eq!(wallet.close_portal().unwrap(), FundingStage::SelectGateway);
    assert!(wallet.intent().is_none());
  }

  #[tokio::test]
  async fn test_failed_credit_keeps_receipt_for_retry() {
    let mut payments = MockPayments::new();
    payments
      .expect_create_intent()
      .returning(|_, gw, amount| Ok(intent(gw, amount)));
    payments.expect_execute().times(1).returning(|gw, intent, _| {
      Ok(SettlementReceipt {
        reference: SettlementRef::new(&gw.provider, "abc123abc123"),
        amount: intent.amount,
        gateway_id: gw.id.clone(),
      })
    });

    let mut store = MockStore::new();
    let mut attempts = 0;
    store.expect_call().returning(move |op| match op {
      Operation::AdjustBalance(_) => {
        attempts += 1;
        if attempts == 1 {
          Err(PersistenceError::RemoteProtocol { status: 503, message: "Try again later".into() })
        } else {
          Ok(Value::Null)
        }
      }
      _ => Ok(Value::Null),
    });

    let wallet = funding(store, payments);
    wallet.open_portal("gw_upi", Money::from_major(75)).await.unwrap();

    let err = wallet.settle(manual()).await.unwrap_err();
    assert_eq!(err.to_string(), "Try again later");
    assert_eq!(wallet.stage(), FundingStage::PortalOpen);
    assert!(wallet.close_portal().is_err());

    assert_eq!(wallet.settle(manual()).await.unwrap(), FundingStage::Settled);
    assert_eq!(wallet.last_credit().unwrap().amount, Money::from_major(75));
    assert!(wallet.selected_gateway().is_none());
  }

  #[tokio::test]
  async fn test_declined_proof_stays_open() {
    let mut payments = MockPayments::new();
    payments
      .expect_create_intent()
      .returning(|_, gw, amount| Ok(intent(gw, amount)));
    payments
      .expect_execute()
      .returning(|_, _, _| Err(PaymentError::VerificationFailed("Payment not received yet".into())));

    let wallet = funding(MockStore::new(), payments);
    wallet.open_portal("gw_upi", Money::from_major(5)).await.unwrap();
    assert!(wallet.settle(manual()).await.is_err());
    assert_eq!(wallet.stage(), FundingStage::PortalOpen);
    assert_eq!(wallet.intent().unwrap().state, IntentState::Declined);
    assert_eq!(wallet.last_error().as_deref(), Some("Payment not received yet"));
  }
}
