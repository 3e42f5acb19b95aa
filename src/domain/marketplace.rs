//! Marketplace entities.
//!
//! Assets (leads), bid/purchase records, users with their vault balance,
//! payment gateway configuration, and the full data snapshot the client
//! polls. These types are shared by the local ledger, the remote wire
//! format and the workflows, so every one of them is serde-friendly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::Money;

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Asset (lead) identifier.
pub type AssetId = String;

/// Bid / purchase record identifier.
pub type BidId = String;

/// User identifier.
pub type UserId = String;

/// Payment gateway identifier.
pub type GatewayId = String;

// ────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────

/// Moderation status shared by assets and bid records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Account standing. Restricted users cannot commit bids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Restricted,
}

/// Gateway availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Active,
    Inactive,
}

/// Day of the week a delivery window operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingDay {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

// ────────────────────────────────────────────
// Records
// ────────────────────────────────────────────

/// A sellable data lead whose price rises through bidding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub title: String,
    pub category: String,
    /// Current price per lead. Set to the latest committed bid amount.
    pub current_price: Money,
    pub bid_count: u32,
    /// Quality score, 0..=100.
    pub quality_score: u8,
    pub status: ReviewStatus,
    pub owner_id: UserId,
}

/// Time-of-day window and operating days for lead delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryWindow {
    /// Start hour, inclusive (0..24).
    pub start_hour: u8,
    /// End hour, exclusive (1..=24).
    pub end_hour: u8,
    pub days: Vec<OperatingDay>,
}

impl DeliveryWindow {
    /// Business hours, Monday to Friday.
    pub fn business_hours() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            days: vec![
                OperatingDay::Mon,
                OperatingDay::Tue,
                OperatingDay::Wed,
                OperatingDay::Thu,
                OperatingDay::Fri,
            ],
        }
    }

    /// Whether the window describes at least one deliverable hour.
    pub fn is_valid(&self) -> bool {
        self.start_hour < self.end_hour && self.end_hour <= 24 && !self.days.is_empty()
    }
}

/// Whether a record was placed as an auction bid or a fixed-price purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidKind {
    Bid,
    Purchase,
}

/// A committed bid or buy-now purchase.
///
/// Created exactly once per successful workflow commit. Only `status`
/// changes afterwards, and only through an administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    /// Client-generated id; doubles as the commit idempotency key.
    pub id: BidId,
    pub asset_id: AssetId,
    pub bidder_id: UserId,
    pub kind: BidKind,
    /// Price per lead.
    pub bid_amount: Money,
    pub leads_per_day: u32,
    /// `bid_amount × leads_per_day`, computed once before commit.
    pub total_cost: Money,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub delivery_endpoint: String,
    pub contact: String,
    pub window: DeliveryWindow,
    /// Settlement reference when the bid was funded through bridging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_ref: Option<String>,
}

/// A marketplace account and its vault balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    /// Spendable balance. Never negative.
    pub balance: Money,
    pub status: AccountStatus,
}

/// Payment gateway configuration, owned by administration.
///
/// `secret_key` never leaves the backend in practice; the client only
/// needs the public half to talk to card networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub id: GatewayId,
    pub name: String,
    /// Provider kind as declared by the admin ("stripe", "upi", "crypto", "bank", ...).
    pub provider: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Fee charged on top of the deposit, in percent.
    #[serde(default)]
    pub fee_percent: Decimal,
    pub status: GatewayStatus,
}

impl GatewayConfig {
    /// Whether the gateway can be offered as a funding option.
    pub fn is_active(&self) -> bool {
        self.status == GatewayStatus::Active
    }
}

/// An entry written to the notification / audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: UserId,
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry stamped now.
    pub fn new(actor_id: &str, action: &str, detail: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The acting user, as supplied by the session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────

/// Full data snapshot read by the polling refresh.
///
/// `last_updated` is the monotonic revision marker: a client only adopts
/// a snapshot whose marker is strictly newer than the last one adopted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
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
    /// Revision marker in Unix milliseconds.
    #[serde(default)]
    pub last_updated: i64,
}

impl MarketSnapshot {
    /// Look up an asset by id.
    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// Look up a user by id.
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Balance of a user, zero if unknown.
    pub fn balance_of(&self, id: &str) -> Money {
        self.user(id).map_or(Money::ZERO, |u| u.balance)
    }

    /// Gateways currently offered as funding options.
    pub fn active_gateways(&self) -> Vec<GatewayConfig> {
        self.gateways.iter().filter(|g| g.is_active()).cloned().collect()
    }

    /// Look up a gateway by id.
    pub fn gateway(&self, id: &str) -> Option<&GatewayConfig> {
        self.gateways.iter().find(|g| g.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deserializes_camel_case_with_defaults() {
        let json = r#"{
            "assets": [{
                "id": "lead_1", "title": "Solar", "category": "energy",
                "currentPrice": 100, "bidCount": 0, "qualityScore": 80,
                "status": "approved", "ownerId": "u_seller"
            }],
            "lastUpdated": 42
        }"#;
        let snap: MarketSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.last_updated, 42);
        assert_eq!(snap.asset("lead_1").unwrap().current_price, Money::from_major(100));
        assert!(snap.users.is_empty());
    }

    #[test]
    fn test_active_gateways_filter() {
        let mk = |id: &str, status| GatewayConfig {
            id: id.to_string(),
            name: id.to_string(),
            provider: "stripe".to_string(),
            public_key: "pk".to_string(),
            secret_key: String::new(),
            fee_percent: Decimal::ZERO,
            status,
        };
        let snap = MarketSnapshot {
            gateways: vec![mk("a", GatewayStatus::Active), mk("b", GatewayStatus::Inactive)],
            ..MarketSnapshot::default()
        };
        let active = snap.active_gateways();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
    }

    #[test]
    fn test_delivery_window_validity() {
        assert!(DeliveryWindow::business_hours().is_valid());
        let inverted = DeliveryWindow { start_hour: 18, end_hour: 9, days: vec![OperatingDay::Sat] };
        assert!(!inverted.is_valid());
    }
}
