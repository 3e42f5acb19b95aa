//! Admin Console - Moderation and Ledger Corrections
//!
//! Every operation requires the admin role and writes a best-effort
//! audit entry after it succeeds.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::domain::marketplace::{
  AccountStatus, Actor, Asset, AuditEntry, GatewayStatus, MarketSnapshot, ReviewStatus,
};
use crate::domain::money::Money;
use crate::ports::persistence::{
  AdjustmentReason, BalanceAdjustment, LedgerStore, Operation, PersistenceError,
};

/// Prefix of balance override references.
pub const OVERRIDE_PREFIX: &str = "ADMIN_OVERRIDE_";

#[derive(Debug, Error)]
pub enum AdminError {
  #[error("Administrator access required")]
  Forbidden,
  #[error("{0} not found")]
  NotFound(String),
  #[error("{0}")]
  Store(#[from] PersistenceError),
}

pub struct AdminConsole<L: LedgerStore> {
  store: Arc<L>,
  snapshots: watch::Receiver<Arc<MarketSnapshot>>,
  actor: Actor,
}

impl<L: LedgerStore> AdminConsole<L> {
  /// Open the console for `actor`. Fails unless the actor is an admin.
  pub fn new(
    store: Arc<L>,
    snapshots: watch::Receiver<Arc<MarketSnapshot>>,
    actor: Actor,
  ) -> Result<Self, AdminError> {
    if !actor.is_admin() {
      return Err(AdminError::Forbidden);
    }
    Ok(Self {
      store,
      snapshots,
      actor,
    })
  }

  /// List a new asset.
  pub async fn create_asset(&self, asset: Asset) -> Result<(), AdminError> {
    let detail = format!("listed {} at {}", asset.id, asset.current_price);
    self.store.call(&Operation::CreateAsset(asset)).await?;
    self.audit("create-asset", detail).await;
    Ok(())
  }

  /// Approve or reject an asset. Only the status is written, so price
  /// and bid count committed since the last poll survive.
  #[instrument(skip(self))]
  pub async fn set_asset_status(&self, asset_id: &str, status: ReviewStatus) -> Result<(), AdminError> {
    if self.snapshots.borrow().asset(asset_id).is_none() {
      return Err(AdminError::NotFound(format!("Lead {asset_id}")));
    }
    self
      .store
      .call(&Operation::UpdateAssetStatus {
        id: asset_id.to_string(),
        status,
      })
      .await?;
    self.audit("update-asset-status", format!("{asset_id} → {status:?}")).await;
    Ok(())
  }

  /// Approve or reject a bid record.
  #[instrument(skip(self))]
  pub async fn set_bid_status(&self, bid_id: &str, status: ReviewStatus) -> Result<(), AdminError> {
    self
      .store
      .call(&Operation::UpdateBidStatus {
        id: bid_id.to_string(),
        status,
      })
      .await?;
    self.audit("update-bid-status", format!("{bid_id} → {status:?}")).await;
    Ok(())
  }

  /// Restrict or reinstate an account.
  #[instrument(skip(self))]
  pub async fn set_user_status(&self, user_id: &str, status: AccountStatus) -> Result<(), AdminError> {
    self
      .store
      .call(&Operation::UpdateUserStatus {
        id: user_id.to_string(),
        status,
      })
      .await?;
    self.audit("update-user-status", format!("{user_id} → {status:?}")).await;
    Ok(())
  }

  /// Apply a signed balance correction. Returns the override reference.
  #[instrument(skip(self, note))]
  pub async fn override_balance(
    &self,
    user_id: &str,
    delta: Money,
    note: &str,
  ) -> Result<String, AdminError> {
    let reference = format!("{OVERRIDE_PREFIX}{}", uuid::Uuid::new_v4().simple());
    self
      .store
      .call(&Operation::AdjustBalance(BalanceAdjustment {
        user_id: user_id.to_string(),
        delta,
        reference: reference.clone(),
        reason: AdjustmentReason::AdminOverride,
      }))
      .await?;

    info!(%reference, %delta, "Balance override applied");
    self
      .audit("adjust-balance", format!("{user_id} {delta} ({reference}): {note}"))
      .await;
    Ok(reference)
  }

  /// Take a gateway on or offline.
  #[instrument(skip(self))]
  pub async fn set_gateway_status(&self, gateway_id: &str, status: GatewayStatus) -> Result<(), AdminError> {
    let mut gateway = self
      .snapshots
      .borrow()
      .gateway(gateway_id)
      .cloned()
      .ok_or_else(|| AdminError::NotFound(format!("Gateway {gateway_id}")))?;
    gateway.status = status;
    self.store.call(&Operation::UpdateConfig(gateway)).await?;
    self.audit("update-config", format!("{gateway_id} → {status:?}")).await;
    Ok(())
  }

  /// Permanently remove an asset.
  #[instrument(skip(self))]
  pub async fn purge_asset(&self, asset_id: &str) -> Result<(), AdminError> {
    self
      .store
      .call(&Operation::DeleteAsset {
        id: asset_id.to_string(),
      })
      .await?;
    self.audit("delete-asset", format!("purged {asset_id}")).await;
    Ok(())
  }

  pub async fn clear_log(&self) -> Result<(), AdminError> {
    self.store.call(&Operation::ClearLog).await?;
    self.audit("clear-log", "audit log cleared".to_string()).await;
    Ok(())
  }

  async fn audit(&self, action: &str, detail: String) {
    let entry = AuditEntry::new(&self.actor.user_id, action, detail);
    if let Err(e) = self.store.call(&Operation::AppendLog(entry)).await {
      warn!(error = %e, action, "Audit entry not written");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::marketplace::Role;
  use crate::ports::persistence::StoreMode;
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

  fn snapshots() -> watch::Receiver<Arc<MarketSnapshot>> {
    watch::channel(Arc::new(MarketSnapshot::default())).1
  }

  #[test]
  fn test_non_admin_is_forbidden() {
    let result = AdminConsole::new(
      Arc::new(MockStore::new()),
      snapshots(),
      Actor::new("u_buyer", Role::User),
    );
    assert!(matches!(result, Err(AdminError::Forbidden)));
  }

  #[tokio::test]
  async fn test_override_uses_admin_reference_and_audits() {
    let mut store = MockStore::new();
    store
      .expect_call()
      .withf(|op| {
        matches!(op, Operation::AdjustBalance(adj)
          if adj.reference.starts_with(OVERRIDE_PREFIX)
            && adj.reason == AdjustmentReason::AdminOverride
            && adj.delta == Money::from_major(-50))
      })
      .times(1)
      .returning(|_| Ok(Value::Null));
    store
      .expect_call()
      .withf(|op| matches!(op, Operation::AppendLog(_)))
      .times(1)
      .returning(|_| Err(PersistenceError::Transport("down".into())));

    let console =
      AdminConsole::new(Arc::new(store), snapshots(), Actor::new("u_admin", Role::Admin)).unwrap();
    let reference = console
      .override_balance("u_buyer", Money::from_major(-50), "chargeback")
      .await
      .unwrap();
    assert!(reference.starts_with("ADMIN_OVERRIDE_"));
  }

  #[tokio::test]
  async fn test_asset_status_writes_status_only() {
    let snapshot = crate::adapters::persistence::fixtures::seed().to_snapshot();
    let (_tx, rx) = watch::channel(Arc::new(snapshot));

    let mut store = MockStore::new();
    store
      .expect_call()
      .withf(|op| {
        matches!(op, Operation::UpdateAssetStatus { id, status }
          if id == "lead_solar_ca" && *status == ReviewStatus::Rejected)
      })
      .times(1)
      .returning(|_| Ok(Value::Null));
    store
      .expect_call()
      .withf(|op| matches!(op, Operation::AppendLog(entry) if entry.action == "update-asset-status"))
      .times(1)
      .returning(|_| Ok(Value::Null));

    let console = AdminConsole::new(Arc::new(store), rx, Actor::new("u_admin", Role::Admin)).unwrap();
    console
      .set_asset_status("lead_solar_ca", ReviewStatus::Rejected)
      .await
      .unwrap();

    let err = console
      .set_asset_status("lead_missing", ReviewStatus::Approved)
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "Lead lead_missing not found");
  }

  #[tokio::test]
  async fn test_unknown_gateway_is_not_found() {
    let console = AdminConsole::new(
      Arc::new(MockStore::new()),
      snapshots(),
      Actor::new("u_admin", Role::Admin),
    )
    .unwrap();
    let err = console
      .set_gateway_status("gw_missing", GatewayStatus::Inactive)
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "Gateway gw_missing not found");
  }
}
