//! Bid Workflow - Bid/Purchase Placement with Optional Bridging
//!
//! Drives one bid (or buy-now purchase) on one asset from parameter
//! collection to commit:
//!
//! ```text
//! Collecting → (Reviewing) → Confirming ─────────────→ Committing → Succeeded
//!                          ↘ Bridging (settle, credit) ↗
//! ```
//!
//! - The first `submit` routes to Confirming when the balance covers the
//!   total, otherwise to Bridging. The second `submit` commits. The
//!   confirmation gate cannot be skipped.
//! - Bridging settles the full total through a payment gateway, credits
//!   it, and commits directly.
//! - Failures park the workflow in `Failed` with the verbatim error and
//!   the stage to resume; `dismiss_error` returns there.
//!
//! Only one mutating call may be outstanding. Duplicate events arriving
//! while one is in flight are ignored and report the current stage.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::domain::marketplace::{
  Actor, AssetId, AuditEntry, BidId, BidRecord, GatewayConfig, MarketSnapshot, ReviewStatus,
};
use crate::domain::money::Money;
use crate::domain::pricing::{check_entry, BidMode, BidParams, CostQuote, GuardViolation};
use crate::domain::settlement::{SettlementIntent, SettlementProof, SettlementReceipt};
use crate::ports::payment::{PaymentError, PaymentGateway};
use crate::ports::persistence::{
  AdjustmentReason, BalanceAdjustment, LedgerStore, Operation, PersistenceError,
};
use crate::usecases::settlement::record_attempt;

/// Workflow stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BidStage {
  Collecting,
  Reviewing,
  Bridging,
  Confirming,
  Committing,
  Succeeded,
  Failed,
}

impl fmt::Display for BidStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Collecting => "collecting",
      Self::Reviewing => "reviewing",
      Self::Bridging => "bridging",
      Self::Confirming => "confirming",
      Self::Committing => "committing",
      Self::Succeeded => "succeeded",
      Self::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// Errors surfaced by the bid and wallet workflows.
///
/// Backend and provider text displays verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
  #[error("Insufficient balance: {available} available, {needed} needed")]
  InsufficientFunds { needed: Money, available: Money },
  #[error("Bid must be at least {floor}")]
  BidBelowFloor { bid: Money, floor: Money },
  /// The commit write failed.
  #[error("{0}")]
  CommitFailed(String),
  #[error(transparent)]
  Payment(#[from] PaymentError),
  /// A non-commit store call failed (balance credit, snapshot).
  #[error("{0}")]
  Persistence(String),
  #[error("Cannot {action} while {stage}")]
  InvalidTransition { stage: BidStage, action: &'static str },
  #[error("{0}")]
  InvalidInput(String),
}

impl From<GuardViolation> for WorkflowError {
  fn from(v: GuardViolation) -> Self {
    match v {
      GuardViolation::BelowFloor { bid, floor } => Self::BidBelowFloor { bid, floor },
      other => Self::InvalidInput(other.to_string()),
    }
  }
}

impl From<PersistenceError> for WorkflowError {
  fn from(e: PersistenceError) -> Self {
    Self::Persistence(e.to_string())
  }
}

/// Funding progress while bridging. Each completed step is kept so a
/// retry only runs the steps still missing.
#[derive(Debug, Clone)]
struct Bridge {
  gateway: GatewayConfig,
  intent: Option<SettlementIntent>,
  receipt: Option<SettlementReceipt>,
  credited: bool,
}

#[derive(Debug)]
struct FlowState {
  stage: BidStage,
  params: Option<BidParams>,
  quote: Option<CostQuote>,
  bridge: Option<Bridge>,
  /// Built on the first commit attempt and reused on every retry.
  record: Option<BidRecord>,
  resume: Option<BidStage>,
  last_error: Option<String>,
  committed: Option<BidRecord>,
}

/// Clears the busy flag when the outstanding call finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// One bid placement on one asset.
///
/// Bound to a single asset, actor and entry mode for its whole life; a
/// new bid needs a new instance (against a possibly moved price).
pub struct BidWorkflow<L: LedgerStore, P: PaymentGateway> {
  store: Arc<L>,
  payments: Arc<P>,
  snapshots: watch::Receiver<Arc<MarketSnapshot>>,
  actor: Actor,
  asset_id: AssetId,
  mode: BidMode,
  min_increment: Money,
  /// Commit idempotency key.
  bid_id: BidId,
  busy: AtomicBool,
  state: Mutex<FlowState>,
}

impl<L: LedgerStore, P: PaymentGateway> BidWorkflow<L, P> {
  pub fn new(
    store: Arc<L>,
    payments: Arc<P>,
    snapshots: watch::Receiver<Arc<MarketSnapshot>>,
    actor: Actor,
    asset_id: impl Into<AssetId>,
    mode: BidMode,
    min_increment: Money,
  ) -> Self {
    Self {
      store,
      payments,
      snapshots,
      actor,
      asset_id: asset_id.into(),
      mode,
      min_increment,
      bid_id: uuid::Uuid::new_v4().to_string(),
      busy: AtomicBool::new(false),
      state: Mutex::new(FlowState {
        stage: BidStage::Collecting,
        params: None,
        quote: None,
        bridge: None,
        record: None,
        resume: None,
        last_error: None,
        committed: None,
      }),
    }
  }

  // ── accessors ─────────────────────────────

  pub fn stage(&self) -> BidStage {
    self.lock().stage
  }

  /// Quote fixed at the last successful entry check.
  pub fn quote(&self) -> Option<CostQuote> {
    self.lock().quote
  }

  /// Verbatim message of the last failure or validation refusal.
  pub fn last_error(&self) -> Option<String> {
    self.lock().last_error.clone()
  }

  /// The committed record, once `Succeeded`.
  pub fn committed(&self) -> Option<BidRecord> {
    self.lock().committed.clone()
  }

  /// Stage `dismiss_error` would return to.
  pub fn resume_stage(&self) -> Option<BidStage> {
    self.lock().resume
  }

  /// Gateway selected for bridging, if any.
  pub fn selected_gateway(&self) -> Option<GatewayConfig> {
    self.lock().bridge.as_ref().map(|b| b.gateway.clone())
  }

  /// Whether the bridging credit already landed.
  pub fn is_credited(&self) -> bool {
    self.lock().bridge.as_ref().is_some_and(|b| b.credited)
  }

  /// Whether a mutating call is outstanding.
  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  pub fn bid_id(&self) -> &str {
    &self.bid_id
  }

  /// Gateways offered while bridging.
  pub fn funding_options(&self) -> Vec<GatewayConfig> {
    self.snapshot().active_gateways()
  }

  // ── events ────────────────────────────────

  /// Record the collected delivery parameters.
  pub fn set_params(&self, params: BidParams) -> Result<(), WorkflowError> {
    let mut st = self.lock();
    if st.stage != BidStage::Collecting {
      return Err(WorkflowError::InvalidTransition {
        stage: st.stage,
        action: "edit the bid",
      });
    }
    st.params = Some(params);
    st.record = None;
    st.last_error = None;
    Ok(())
  }

  /// Run the entry guard and move to Reviewing.
  ///
  /// A refusal leaves the workflow in Collecting with the message kept.
  pub fn review(&self) -> Result<BidStage, WorkflowError> {
    let mut st = self.lock();
    if st.stage != BidStage::Collecting {
      return Err(WorkflowError::InvalidTransition {
        stage: st.stage,
        action: "review",
      });
    }
    self.check_guard(&mut st)?;
    st.stage = BidStage::Reviewing;
    Ok(st.stage)
  }

  /// Advance the workflow.
  ///
  /// From Collecting or Reviewing this routes to Confirming or Bridging.
  /// From Confirming it commits.
  #[instrument(skip(self), fields(asset = %self.asset_id, bid = %self.bid_id))]
  pub async fn submit(&self) -> Result<BidStage, WorkflowError> {
    let Some(_busy) = self.try_busy() else {
      debug!("Submit ignored, a call is outstanding");
      return Ok(self.stage());
    };

    let stage = self.stage();
    match stage {
      BidStage::Collecting | BidStage::Reviewing => {
        let mut st = self.lock();
        if st.stage == BidStage::Collecting {
          self.check_guard(&mut st)?;
        }
        let Some(quote) = st.quote else {
          return Err(WorkflowError::InvalidInput("Bid details are incomplete".into()));
        };
        let available = self.balance();
        st.stage = if quote.total_cost > available {
          info!(total = %quote.total_cost, %available, "Balance short, bridging required");
          BidStage::Bridging
        } else {
          BidStage::Confirming
        };
        Ok(st.stage)
      }
      BidStage::Confirming => self.commit_confirmed().await,
      other => Err(WorkflowError::InvalidTransition {
        stage: other,
        action: "submit",
      }),
    }
  }

  /// Choose the funding gateway while bridging.
  pub fn select_gateway(&self, gateway_id: &str) -> Result<(), WorkflowError> {
    if self.is_busy() {
      return Err(WorkflowError::InvalidTransition {
        stage: self.stage(),
        action: "change gateway",
      });
    }

    let gateway = self
      .funding_options()
      .into_iter()
      .find(|g| g.id == gateway_id)
      .ok_or_else(|| WorkflowError::InvalidInput("That gateway is not available".into()))?;
    self.payments.validate(&gateway)?;

    let mut st = self.lock();
    if st.stage != BidStage::Bridging {
      return Err(WorkflowError::InvalidTransition {
        stage: st.stage,
        action: "choose a gateway",
      });
    }
    if let Some(existing) = st.bridge.as_ref() {
      if existing.credited || existing.receipt.is_some() {
        return Err(WorkflowError::InvalidInput(
          "Funds are already settled for this bid".into(),
        ));
      }
      if existing.gateway.id == gateway.id {
        return Ok(());
      }
    }
    st.bridge = Some(Bridge {
      gateway,
      intent: None,
      receipt: None,
      credited: false,
    });
    st.last_error = None;
    Ok(())
  }

  /// Settle the bridge, credit it and commit.
  ///
  /// Resumable: a receipt already held skips `execute`, a credit already
  /// applied skips the credit.
  #[instrument(skip(self, proof), fields(asset = %self.asset_id, bid = %self.bid_id))]
  pub async fn settle(&self, proof: SettlementProof) -> Result<BidStage, WorkflowError> {
    let Some(_busy) = self.try_busy() else {
      debug!("Settle ignored, a call is outstanding");
      return Ok(self.stage());
    };

    let (bridge, quote) = {
      let st = self.lock();
      if st.stage != BidStage::Bridging {
        return Err(WorkflowError::InvalidTransition {
          stage: st.stage,
          action: "settle",
        });
      }
      let Some(bridge) = st.bridge.clone() else {
        return Err(WorkflowError::InvalidInput("Select a funding gateway first".into()));
      };
      let Some(quote) = st.quote else {
        return Err(WorkflowError::InvalidInput("Bid details are incomplete".into()));
      };
      (bridge, quote)
    };

    let receipt = match bridge.receipt.clone() {
      Some(receipt) => receipt,
      None => self.run_settlement(&bridge, quote, &proof).await?,
    };

    if !bridge.credited {
      self.credit(&receipt).await?;
    }

    self.commit(Some(receipt.reference.to_string()), BidStage::Bridging).await
  }

  /// Abandon bridging or confirmation and go back to editing.
  pub fn cancel(&self) -> Result<BidStage, WorkflowError> {
    if self.is_busy() {
      return Err(WorkflowError::InvalidTransition {
        stage: self.stage(),
        action: "cancel",
      });
    }
    let mut st = self.lock();
    let cancellable = match st.stage {
      BidStage::Reviewing | BidStage::Bridging | BidStage::Confirming => true,
      BidStage::Failed => st.resume.is_some_and(|r| r != BidStage::Collecting),
      _ => false,
    };
    if !cancellable {
      return Err(WorkflowError::InvalidTransition {
        stage: st.stage,
        action: "cancel",
      });
    }

    if st
      .bridge
      .as_ref()
      .is_some_and(|b| b.receipt.is_some() && !b.credited)
    {
      return Err(WorkflowError::InvalidInput(
        "Payment already settled, crediting must be retried".into(),
      ));
    }
    if st.bridge.as_ref().is_some_and(|b| b.credited) {
      info!("Bridge cancelled after credit, funds stay in the vault");
    }
    st.stage = BidStage::Collecting;
    st.bridge = None;
    st.record = None;
    st.resume = None;
    st.last_error = None;
    Ok(st.stage)
  }

  /// Leave `Failed` for the stage the failure happened in.
  pub fn dismiss_error(&self) -> Result<BidStage, WorkflowError> {
    let mut st = self.lock();
    if st.stage != BidStage::Failed {
      return Err(WorkflowError::InvalidTransition {
        stage: st.stage,
        action: "dismiss",
      });
    }
    st.stage = st.resume.take().unwrap_or(BidStage::Collecting);
    st.last_error = None;
    Ok(st.stage)
  }

  // ── internals ─────────────────────────────

  fn lock(&self) -> MutexGuard<'_, FlowState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn try_busy(&self) -> Option<BusyGuard<'_>> {
    self
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| BusyGuard(&self.busy))
  }

  fn snapshot(&self) -> Arc<MarketSnapshot> {
    Arc::clone(&self.snapshots.borrow())
  }

  fn balance(&self) -> Money {
    self.snapshot().balance_of(&self.actor.user_id)
  }

  /// Entry guard. Fixes the quote on success, keeps the message on refusal.
  fn check_guard(&self, st: &mut FlowState) -> Result<(), WorkflowError> {
    let result = self.guard_params(st.params.as_ref());
    match result {
      Ok(quote) => {
        st.quote = Some(quote);
        st.last_error = None;
        Ok(())
      }
      Err(e) => {
        st.last_error = Some(e.to_string());
        Err(e)
      }
    }
  }

  fn guard_params(&self, params: Option<&BidParams>) -> Result<CostQuote, WorkflowError> {
    let params =
      params.ok_or_else(|| WorkflowError::InvalidInput("Bid details are incomplete".into()))?;
    let snapshot = self.snapshot();
    let asset = snapshot
      .asset(&self.asset_id)
      .ok_or_else(|| WorkflowError::InvalidInput("This lead is no longer available".into()))?;
    check_entry(asset, self.mode, self.min_increment, params)?;
    Ok(CostQuote::for_params(params)?)
  }

  /// Move to `Failed`, remembering where to resume.
  fn fail(&self, resume: BidStage, err: WorkflowError) -> WorkflowError {
    let mut st = self.lock();
    st.stage = BidStage::Failed;
    st.resume = Some(resume);
    st.last_error = Some(err.to_string());
    warn!(error = %err, %resume, "Bid workflow failed");
    err
  }

  async fn run_settlement(
    &self,
    bridge: &Bridge,
    quote: CostQuote,
    proof: &SettlementProof,
  ) -> Result<SettlementReceipt, WorkflowError> {
    let mut intent = match bridge.intent.clone().filter(SettlementIntent::is_usable) {
      Some(intent) => intent,
      None => match self
        .payments
        .create_intent(&self.actor.user_id, &bridge.gateway, quote.total_cost)
        .await
      {
        Ok(intent) => intent,
        Err(e) => return Err(self.fail(BidStage::Bridging, e.into())),
      },
    };

    let proof_result = self.payments.execute(&bridge.gateway, &intent, proof).await;
    record_attempt(&mut intent, &proof_result);

    let mut st = self.lock();
    let Some(slot) = st.bridge.as_mut() else {
      return Err(WorkflowError::InvalidInput("Funding gateway was cleared".into()));
    };
    match proof_result {
      Ok(receipt) => {
        slot.intent = Some(intent);
        slot.receipt = Some(receipt.clone());
        Ok(receipt)
      }
      Err(e) => {
        slot.intent = intent.is_usable().then_some(intent);
        drop(st);
        Err(self.fail(BidStage::Bridging, e.into()))
      }
    }
  }

  async fn credit(&self, receipt: &SettlementReceipt) -> Result<(), WorkflowError> {
    let adjustment = BalanceAdjustment {
      user_id: self.actor.user_id.clone(),
      delta: receipt.amount,
      reference: receipt.reference.to_string(),
      reason: AdjustmentReason::Deposit,
    };
    if let Err(e) = self.store.call(&Operation::AdjustBalance(adjustment)).await {
      return Err(self.fail(BidStage::Bridging, e.into()));
    }

    if let Some(bridge) = self.lock().bridge.as_mut() {
      bridge.credited = true;
    }
    info!(reference = %receipt.reference, amount = %receipt.amount, "Bridge funds credited");
    self
      .audit("deposit", format!("{} credited via {}", receipt.amount, receipt.reference))
      .await;
    Ok(())
  }

  async fn commit_confirmed(&self) -> Result<BidStage, WorkflowError> {
    let Some(quote) = self.quote() else {
      return Err(WorkflowError::InvalidInput("Bid details are incomplete".into()));
    };
    let available = self.balance();
    if quote.total_cost > available {
      let err = WorkflowError::InsufficientFunds {
        needed: quote.total_cost,
        available,
      };
      let mut st = self.lock();
      st.stage = BidStage::Bridging;
      st.last_error = Some(err.to_string());
      return Err(err);
    }
    self.commit(None, BidStage::Confirming).await
  }

  async fn commit(
    &self,
    settlement_ref: Option<String>,
    resume: BidStage,
  ) -> Result<BidStage, WorkflowError> {
    let record = {
      let mut st = self.lock();
      let record = match st.record.clone() {
        Some(mut record) => {
          if settlement_ref.is_some() {
            record.settlement_ref.clone_from(&settlement_ref);
          }
          record
        }
        None => {
          let (Some(params), Some(quote)) = (st.params.clone(), st.quote) else {
            return Err(WorkflowError::InvalidInput("Bid details are incomplete".into()));
          };
          BidRecord {
            id: self.bid_id.clone(),
            asset_id: self.asset_id.clone(),
            bidder_id: self.actor.user_id.clone(),
            kind: self.mode.kind(),
            bid_amount: quote.bid_amount,
            leads_per_day: quote.leads_per_day,
            total_cost: quote.total_cost,
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
            delivery_endpoint: params.endpoint,
            contact: params.contact,
            window: params.window,
            settlement_ref,
          }
        }
      };
      st.record = Some(record.clone());
      st.stage = BidStage::Committing;
      st.last_error = None;
      record
    };

    let started = Instant::now();
    if let Err(e) = self.store.call(&Operation::CommitBid(record.clone())).await {
      return Err(self.fail(resume, WorkflowError::CommitFailed(e.to_string())));
    }

    info!(
      total = %record.total_cost,
      elapsed_ms = started.elapsed().as_millis(),
      "Bid committed"
    );
    {
      let mut st = self.lock();
      st.stage = BidStage::Succeeded;
      st.resume = None;
      st.committed = Some(record.clone());
    }
    self
      .audit(
        "commit-bid",
        format!("{} x {} on {}", record.bid_amount, record.leads_per_day, record.asset_id),
      )
      .await;
    Ok(BidStage::Succeeded)
  }

  async fn audit(&self, action: &str, detail: String) {
    let entry = AuditEntry::new(&self.actor.user_id, action, detail);
    if let Err(e) = self.store.call(&Operation::AppendLog(entry)).await {
      warn!(error = %e, action, "Audit entry not written");
    }
  }
}
