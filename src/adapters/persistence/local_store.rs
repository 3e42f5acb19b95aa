//! Local Ledger - Whole-blob JSON Store for Fallback Mode
//!
//! Serves every logical operation from a single JSON document on disk,
//! seeded with fixture data on first use. Each mutation reads the whole
//! blob, applies the change by id-matched replace, and writes the whole
//! blob back (temp file, then rename).
//!
//! Concurrency: there is no locking. Two writers racing on the same
//! file (for example two bids on one asset committed "simultaneously")
//! resolve as last-write-wins; the earlier write can be lost. This is
//! the accepted weakness of the fallback path.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, instrument};

use super::fixtures;
use crate::domain::marketplace::{
    AccountStatus, Asset, AuditEntry, BidRecord, GatewayConfig, MarketSnapshot, User,
};
use crate::ports::persistence::{Operation, PersistenceError};

/// The complete local data set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBlob {
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub bids: Vec<BidRecord>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,
    #[serde(default)]
    pub logs: Vec<AuditEntry>,
    /// Balance-adjustment references already applied.
    #[serde(default)]
    pub applied_references: Vec<String>,
    /// Monotonic revision marker (Unix ms).
    #[serde(default)]
    pub last_updated: i64,
}

impl LedgerBlob {
    /// View the blob as a client snapshot.
    pub fn to_snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            assets: self.assets.clone(),
            bids: self.bids.clone(),
            users: self.users.clone(),
            gateways: self.gateways.clone(),
            logs: self.logs.clone(),
            last_updated: self.last_updated,
        }
    }

    /// Apply one operation in memory, returning the affected record.
    ///
    /// The revision marker advances on every change. Replayed commits
    /// and already-applied balance references are no-ops that return
    /// the existing record without advancing it.
    pub fn apply(&mut self, op: &Operation, now_ms: i64) -> Result<Value, PersistenceError> {
        let result = match op {
            Operation::CreateAsset(asset) => {
                if self.assets.iter().any(|a| a.id == asset.id) {
                    return Err(PersistenceError::Rejected(format!(
                        "Lead {} already exists",
                        asset.id
                    )));
                }
                self.assets.push(asset.clone());
                serde_json::to_value(asset)?
            }
            Operation::UpdateAsset(asset) => {
                let slot = self
                    .assets
                    .iter_mut()
                    .find(|a| a.id == asset.id)
                    .ok_or_else(|| not_found("Lead", &asset.id))?;
                *slot = asset.clone();
                serde_json::to_value(asset)?
            }
            Operation::DeleteAsset { id } => {
                let before = self.assets.len();
                self.assets.retain(|a| &a.id != id);
                if self.assets.len() == before {
                    return Err(not_found("Lead", id));
                }
                serde_json::json!({ "id": id, "deleted": true })
            }
            Operation::CommitBid(bid) => {
                if let Some(existing) = self.bids.iter().find(|b| b.id == bid.id) {
                    debug!(bid_id = %bid.id, "Commit replayed, returning existing record");
                    return Ok(serde_json::to_value(existing)?);
                }
                self.commit_bid(bid)?
            }
            Operation::AdjustBalance(adj) => {
                if self.applied_references.iter().any(|r| r == &adj.reference) {
                    let user = self
                        .users
                        .iter()
                        .find(|u| u.id == adj.user_id)
                        .ok_or_else(|| not_found("User", &adj.user_id))?;
                    debug!(reference = %adj.reference, "Balance reference already applied");
                    return Ok(serde_json::to_value(user)?);
                }
                let user = self
                    .users
                    .iter_mut()
                    .find(|u| u.id == adj.user_id)
                    .ok_or_else(|| not_found("User", &adj.user_id))?;
                let updated = user
                    .balance
                    .checked_add(adj.delta)
                    .ok_or_else(|| PersistenceError::Rejected("Amount is out of range".to_string()))?;
                if updated.is_negative() {
                    return Err(PersistenceError::Rejected(
                        "Balance cannot go below zero".to_string(),
                    ));
                }
                user.balance = updated;
                let value = serde_json::to_value(&*user)?;
                self.applied_references.push(adj.reference.clone());
                value
            }
            Operation::UpdateConfig(gateway) => {
                match self.gateways.iter_mut().find(|g| g.id == gateway.id) {
                    Some(slot) => *slot = gateway.clone(),
                    None => self.gateways.push(gateway.clone()),
                }
                serde_json::to_value(gateway)?
            }
            Operation::UpdateAssetStatus { id, status } => {
                let asset = self
                    .assets
                    .iter_mut()
                    .find(|a| &a.id == id)
                    .ok_or_else(|| not_found("Lead", id))?;
                asset.status = *status;
                serde_json::to_value(&*asset)?
            }
            Operation::UpdateBidStatus { id, status } => {
                let bid = self
                    .bids
                    .iter_mut()
                    .find(|b| &b.id == id)
                    .ok_or_else(|| not_found("Bid", id))?;
                bid.status = *status;
                serde_json::to_value(&*bid)?
            }
            Operation::UpdateUserStatus { id, status } => {
                let user = self
                    .users
                    .iter_mut()
                    .find(|u| &u.id == id)
                    .ok_or_else(|| not_found("User", id))?;
                user.status = *status;
                serde_json::to_value(&*user)?
            }
            Operation::AppendLog(entry) => {
                self.logs.push(entry.clone());
                serde_json::to_value(entry)?
            }
            Operation::ClearLog => {
                let cleared = self.logs.len();
                self.logs.clear();
                serde_json::json!({ "cleared": cleared })
            }
        };

        self.bump(now_ms);
        Ok(result)
    }

    fn commit_bid(&mut self, bid: &BidRecord) -> Result<Value, PersistenceError> {
        let asset = self
            .assets
            .iter_mut()
            .find(|a| a.id == bid.asset_id)
            .ok_or_else(|| not_found("Lead", &bid.asset_id))?;
        let user = self
            .users
            .iter_mut()
            .find(|u| u.id == bid.bidder_id)
            .ok_or_else(|| not_found("User", &bid.bidder_id))?;

        if user.status == AccountStatus::Restricted {
            return Err(PersistenceError::Rejected("Account is restricted".to_string()));
        }
        if user.balance < bid.total_cost {
            return Err(PersistenceError::Rejected(
                "Insufficient vault balance".to_string(),
            ));
        }

        user.balance = user
            .balance
            .checked_sub(bid.total_cost)
            .ok_or_else(|| PersistenceError::Rejected("Amount is out of range".to_string()))?;
        asset.current_price = bid.bid_amount;
        asset.bid_count += 1;
        self.bids.push(bid.clone());

        Ok(serde_json::to_value(bid)?)
    }

    fn bump(&mut self, now_ms: i64) {
        self.last_updated = now_ms.max(self.last_updated + 1);
    }
}

fn not_found(kind: &str, id: &str) -> PersistenceError {
    PersistenceError::Rejected(format!("{kind} {id} not found"))
}

fn local_err(context: &str, e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::Local(format!("{context}: {e}"))
}

/// Durable local store backing fallback mode.
pub struct LocalStore {
    /// Path to the ledger JSON file.
    path: PathBuf,
}

impl LocalStore {
    /// Open a store at `path`, creating the parent directory if needed.
    ///
    /// The file itself is created (and seeded) lazily on first use.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| local_err("Failed to create ledger directory", e))?;
        }
        Ok(Self { path })
    }

    /// Path to the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole blob, seeding fixtures if the file does not exist.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<LedgerBlob, PersistenceError> {
        if !fs::try_exists(&self.path)
            .await
            .map_err(|e| local_err("Failed to stat ledger", e))?
        {
            let mut blob = fixtures::seed();
            blob.last_updated = Utc::now().timestamp_millis();
            self.save(&blob).await?;
            info!(path = %self.path.display(), "Local ledger seeded with fixtures");
            return Ok(blob);
        }

        let json = fs::read_to_string(&self.path)
            .await
            .map_err(|e| local_err("Failed to read ledger", e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write the whole blob (tmp → rename).
    async fn save(&self, blob: &LedgerBlob) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(blob)?;

        let tmp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp_path, &json)
            .await
            .map_err(|e| local_err("Failed to write tmp ledger", e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| local_err("Failed to rename ledger", e))?;

        Ok(())
    }

    /// Read, mutate and write back the whole blob.
    #[instrument(skip(self, op), fields(action = op.action()))]
    pub async fn apply(&self, op: &Operation) -> Result<Value, PersistenceError> {
        let mut blob = self.load().await?;
        let before = blob.last_updated;
        let result = blob.apply(op, Utc::now().timestamp_millis())?;
        if blob.last_updated != before {
            self.save(&blob).await?;
        }
        Ok(result)
    }

    /// Current data as a snapshot.
    pub async fn snapshot(&self) -> Result<MarketSnapshot, PersistenceError> {
        Ok(self.load().await?.to_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::marketplace::{BidKind, DeliveryWindow, ReviewStatus};
    use crate::domain::money::Money;
    use crate::ports::persistence::{AdjustmentReason, BalanceAdjustment};
    use tempfile::TempDir;

    fn bid(id: &str, amount: i64, leads: u32) -> BidRecord {
        let bid_amount = Money::from_major(amount);
        BidRecord {
            id: id.to_string(),
            asset_id: "lead_solar_ca".to_string(),
            bidder_id: fixtures::BUYER_ID.to_string(),
            kind: BidKind::Bid,
            bid_amount,
            leads_per_day: leads,
            total_cost: bid_amount.times(leads).unwrap(),
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
            delivery_endpoint: "https://crm.example/hook".to_string(),
            contact: "buyer@example.com".to_string(),
            window: DeliveryWindow::business_hours(),
            settlement_ref: None,
        }
    }

    fn deposit(reference: &str, amount: i64) -> Operation {
        Operation::AdjustBalance(BalanceAdjustment {
            user_id: fixtures::BUYER_ID.to_string(),
            delta: Money::from_major(amount),
            reference: reference.to_string(),
            reason: AdjustmentReason::Deposit,
        })
    }

    #[test]
    fn test_commit_moves_price_and_deducts_balance() {
        let mut blob = fixtures::seed();
        blob.apply(&Operation::CommitBid(bid("b1", 100, 10)), 1).unwrap();

        let snap = blob.to_snapshot();
        let asset = snap.asset("lead_solar_ca").unwrap();
        assert_eq!(asset.current_price, Money::from_major(100));
        assert_eq!(asset.bid_count, 1);
        assert_eq!(snap.balance_of(fixtures::BUYER_ID), Money::from_major(1000));
        assert_eq!(snap.bids[0].total_cost, Money::from_major(1000));
    }

    #[test]
    fn test_commit_replay_is_noop() {
        let mut blob = fixtures::seed();
        blob.apply(&Operation::CommitBid(bid("b1", 100, 10)), 1).unwrap();
        let revision = blob.last_updated;
        blob.apply(&Operation::CommitBid(bid("b1", 100, 10)), 2).unwrap();

        assert_eq!(blob.bids.len(), 1);
        assert_eq!(blob.last_updated, revision);
        assert_eq!(blob.to_snapshot().balance_of(fixtures::BUYER_ID), Money::from_major(1000));
    }

    #[test]
    fn test_commit_rejects_insufficient_balance() {
        let mut blob = fixtures::seed();
        let err = blob.apply(&Operation::CommitBid(bid("b1", 300, 10)), 1).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient vault balance");
        assert!(blob.bids.is_empty());
    }

    #[test]
    fn test_balance_reference_applied_once() {
        let mut blob = fixtures::seed();
        blob.apply(&deposit("UPI_SETTLE_abc", 250), 1).unwrap();
        blob.apply(&deposit("UPI_SETTLE_abc", 250), 2).unwrap();
        assert_eq!(blob.to_snapshot().balance_of(fixtures::BUYER_ID), Money::from_major(2250));
    }

    #[test]
    fn test_balance_never_negative() {
        let mut blob = fixtures::seed();
        let err = blob.apply(&deposit("ADMIN_OVERRIDE_1", -5000), 1).unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected(_)));
    }

    #[test]
    fn test_asset_status_keeps_price_and_bid_count() {
        let mut blob = fixtures::seed();
        blob.apply(&Operation::CommitBid(bid("b1", 100, 10)), 1).unwrap();
        blob.apply(
            &Operation::UpdateAssetStatus {
                id: "lead_solar_ca".to_string(),
                status: ReviewStatus::Rejected,
            },
            2,
        )
        .unwrap();

        let snap = blob.to_snapshot();
        let asset = snap.asset("lead_solar_ca").unwrap();
        assert_eq!(asset.status, ReviewStatus::Rejected);
        assert_eq!(asset.current_price, Money::from_major(100));
        assert_eq!(asset.bid_count, 1);
    }

    #[test]
    fn test_update_asset_replaces_listing() {
        let mut blob = fixtures::seed();
        let mut listing = blob.assets[0].clone();
        listing.title = "Relisted".to_string();
        blob.apply(&Operation::UpdateAsset(listing.clone()), 1).unwrap();
        assert_eq!(blob.assets[0], listing);

        listing.id = "lead_missing".to_string();
        let err = blob.apply(&Operation::UpdateAsset(listing), 2).unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected(_)));
    }

    #[test]
    fn test_oversized_deposit_rejected_and_not_recorded() {
        let mut blob = fixtures::seed();
        let op = Operation::AdjustBalance(BalanceAdjustment {
            user_id: fixtures::BUYER_ID.to_string(),
            delta: Money::parse("79228162514264337593543950335").unwrap(),
            reference: "UPI_SETTLE_huge".to_string(),
            reason: AdjustmentReason::Deposit,
        });
        let before = blob.clone();
        let err = blob.apply(&op, 1).unwrap_err();
        assert_eq!(err.to_string(), "Amount is out of range");
        assert_eq!(blob, before);
    }

    #[test]
    fn test_revision_is_monotonic_even_with_clock_skew() {
        let mut blob = fixtures::seed();
        blob.last_updated = 1_000;
        blob.apply(&Operation::ClearLog, 500).unwrap();
        assert_eq!(blob.last_updated, 1_001);
    }

    #[tokio::test]
    async fn test_store_seeds_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path().join("nested/ledger.json")).await.unwrap();

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.assets.len(), 3);
        assert!(store.path().exists());

        store.apply(&deposit("UPI_SETTLE_x", 250)).await.unwrap();
        let reopened = LocalStore::open(store.path()).await.unwrap();
        let snap2 = reopened.snapshot().await.unwrap();
        assert_eq!(snap2.balance_of(fixtures::BUYER_ID), Money::from_major(2250));
        assert!(snap2.last_updated > snap.last_updated);
    }
}
