//! Persistence Port - Dual-mode Data Access Interface
//!
//! Defines the logical operations the engine performs against its data
//! store, the error taxonomy of that store, and two traits:
//! - `RemoteBackend`: the action-addressed remote service (transport only)
//! - `LedgerStore`: the facade the workflows use, which may be served by
//!   the remote service or by the local durable fallback

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::marketplace::{
  AccountStatus, Asset, AssetId, AuditEntry, BidId, BidRecord, GatewayConfig, MarketSnapshot,
  ReviewStatus, UserId,
};
use crate::domain::money::Money;

/// Why a vault balance is being adjusted outside a bid commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdjustmentReason {
  /// Funds settled through a payment gateway.
  Deposit,
  /// Manual correction by an administrator.
  AdminOverride,
}

/// A signed change to one user's balance.
///
/// `reference` is the provenance tag (a settlement reference or an
/// admin override id). Stores apply a given reference at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAdjustment {
  pub user_id: UserId,
  pub delta: Money,
  pub reference: String,
  pub reason: AdjustmentReason,
}

/// A logical store operation, addressed remotely by its action name.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
  CreateAsset(Asset),
  UpdateAsset(Asset),
  /// Explicit purge. Assets are otherwise never hard-deleted.
  DeleteAsset { id: AssetId },
  /// Write a bid/purchase record, deduct its total from the bidder and
  /// move the asset's price and bid count.
  CommitBid(BidRecord),
  AdjustBalance(BalanceAdjustment),
  UpdateConfig(GatewayConfig),
  /// Moderation change that leaves price and bid count untouched.
  UpdateAssetStatus { id: AssetId, status: ReviewStatus },
  UpdateBidStatus { id: BidId, status: ReviewStatus },
  UpdateUserStatus { id: UserId, status: AccountStatus },
  AppendLog(AuditEntry),
  ClearLog,
}

impl Operation {
  /// Remote action selector.
  pub fn action(&self) -> &'static str {
    match self {
      Self::CreateAsset(_) => "create-asset",
      Self::UpdateAsset(_) => "update-asset",
      Self::DeleteAsset { .. } => "delete-asset",
      Self::CommitBid(_) => "commit-bid",
      Self::AdjustBalance(_) => "adjust-balance",
      Self::UpdateConfig(_) => "update-config",
      Self::UpdateAssetStatus { .. } => "update-asset-status",
      Self::UpdateBidStatus { .. } => "update-bid-status",
      Self::UpdateUserStatus { .. } => "update-user-status",
      Self::AppendLog(_) => "append-log",
      Self::ClearLog => "clear-log",
    }
  }

  /// JSON body sent with the action.
  pub fn payload(&self) -> Result<Value, serde_json::Error> {
    match self {
      Self::CreateAsset(asset) | Self::UpdateAsset(asset) => serde_json::to_value(asset),
      Self::DeleteAsset { id } => Ok(serde_json::json!({ "id": id })),
      Self::CommitBid(bid) => serde_json::to_value(bid),
      Self::AdjustBalance(adj) => serde_json::to_value(adj),
      Self::UpdateConfig(gateway) => serde_json::to_value(gateway),
      Self::UpdateAssetStatus { id, status } | Self::UpdateBidStatus { id, status } => {
        Ok(serde_json::json!({ "id": id, "status": status }))
      }
      Self::UpdateUserStatus { id, status } => {
        Ok(serde_json::json!({ "id": id, "status": status }))
      }
      Self::AppendLog(entry) => serde_json::to_value(entry),
      Self::ClearLog => Ok(serde_json::json!({})),
    }
  }
}

/// Which backing store currently serves operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
  Remote,
  /// Degraded, local-only mode. Latched for the rest of the session.
  Fallback,
}

/// Errors from the persistence layer.
///
/// Messages that originate from the backend (`RemoteProtocol`,
/// `Rejected`) display verbatim.
#[derive(Debug, Error)]
pub enum PersistenceError {
  /// The remote endpoint could not be reached. Triggers fallback.
  #[error("Backend unreachable: {0}")]
  Transport(String),
  /// Non-2xx response with a body. Surfaced, no fallback.
  #[error("{message}")]
  RemoteProtocol { status: u16, message: String },
  /// No backend deployed at the endpoint. Triggers fallback.
  #[error("Backend not found: {0}")]
  NotFound(String),
  /// The store refused the operation (unknown record, insufficient
  /// balance, ...).
  #[error("{0}")]
  Rejected(String),
  /// The local durable store could not be read or written.
  #[error("Local store error: {0}")]
  Local(String),
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
  /// Whether this failure flips the gateway into fallback mode.
  pub fn triggers_fallback(&self) -> bool {
    matches!(self, Self::Transport(_) | Self::NotFound(_))
  }
}

/// The remote data service, addressed by action name.
#[async_trait]
pub trait RemoteBackend: Send + Sync + 'static {
  /// Invoke `action` with a JSON body and return the JSON response.
  async fn call(&self, action: &str, payload: &Value) -> Result<Value, PersistenceError>;

  /// Read the full data snapshot.
  async fn fetch_snapshot(&self) -> Result<MarketSnapshot, PersistenceError>;
}

/// Data-access facade used by the workflows and the polling refresh.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
  /// Apply one logical operation.
  async fn call(&self, op: &Operation) -> Result<Value, PersistenceError>;

  /// Read the full data snapshot.
  async fn snapshot(&self) -> Result<MarketSnapshot, PersistenceError>;

  /// Which backing store is currently in use.
  fn mode(&self) -> StoreMode;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fallback_trigger_classification() {
    assert!(PersistenceError::Transport("refused".into()).triggers_fallback());
    assert!(PersistenceError::NotFound("/api".into()).triggers_fallback());
    assert!(!PersistenceError::RemoteProtocol { status: 500, message: "boom".into() }
      .triggers_fallback());
    assert!(!PersistenceError::Rejected("Insufficient vault balance".into()).triggers_fallback());
  }

  #[test]
  fn test_backend_messages_display_verbatim() {
    let err = PersistenceError::RemoteProtocol {
      status: 409,
      message: "Lead already sold".into(),
    };
    assert_eq!(err.to_string(), "Lead already sold");
    assert_eq!(PersistenceError::Rejected("nope".into()).to_string(), "nope");
  }

  #[test]
  fn test_operation_payloads() {
    let op = Operation::DeleteAsset { id: "lead_9".into() };
    assert_eq!(op.action(), "delete-asset");
    assert_eq!(op.payload().unwrap()["id"], "lead_9");
    assert_eq!(Operation::ClearLog.action(), "clear-log");
  }
}
