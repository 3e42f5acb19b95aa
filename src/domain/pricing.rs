//! Bid floor rules and cost quotes.
//!
//! The entry guard for the bid workflow lives here so it can be checked
//! (and property-tested) without any I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::marketplace::{Asset, BidKind, DeliveryWindow, ReviewStatus};
use super::money::{total_cost, Money};

/// How the workflow was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidMode {
    /// Competitive bid. Floor is the current price, plus the minimum
    /// increment once the asset already carries bids.
    Auction,
    /// Fixed-price purchase at the quoted price.
    BuyNow { quoted: Money },
}

impl BidMode {
    pub fn kind(self) -> BidKind {
        match self {
            Self::Auction => BidKind::Bid,
            Self::BuyNow { .. } => BidKind::Purchase,
        }
    }
}

/// Lowest acceptable per-lead amount for `asset` in `mode`.
pub fn bid_floor(
    asset: &Asset,
    mode: BidMode,
    min_increment: Money,
) -> Result<Money, GuardViolation> {
    match mode {
        BidMode::BuyNow { quoted } => Ok(quoted),
        BidMode::Auction if asset.bid_count == 0 => Ok(asset.current_price),
        BidMode::Auction => asset
            .current_price
            .checked_add(min_increment)
            .ok_or(GuardViolation::AmountTooLarge),
    }
}

/// Delivery parameters gathered while collecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidParams {
    /// Destination endpoint (webhook / CRM URL) leads are delivered to.
    pub endpoint: String,
    /// Contact address for the buyer.
    pub contact: String,
    pub leads_per_day: u32,
    /// Per-lead amount.
    pub bid_amount: Money,
    pub window: DeliveryWindow,
}

/// Why the entry guard refused the collected parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("Bid must be at least {floor}")]
    BelowFloor { bid: Money, floor: Money },
    #[error("This lead is not open for bidding")]
    AssetNotOpen,
    #[error("Daily volume must be at least 1 lead")]
    ZeroVolume,
    #[error("Delivery endpoint is required")]
    MissingEndpoint,
    #[error("Contact information is required")]
    MissingContact,
    #[error("Delivery window is invalid")]
    InvalidWindow,
    #[error("Bid amount is too large")]
    AmountTooLarge,
}

/// Check collected parameters against the asset and floor.
pub fn check_entry(
    asset: &Asset,
    mode: BidMode,
    min_increment: Money,
    params: &BidParams,
) -> Result<(), GuardViolation> {
    if asset.status != ReviewStatus::Approved {
        return Err(GuardViolation::AssetNotOpen);
    }
    if params.endpoint.trim().is_empty() {
        return Err(GuardViolation::MissingEndpoint);
    }
    if params.contact.trim().is_empty() {
        return Err(GuardViolation::MissingContact);
    }
    if params.leads_per_day == 0 {
        return Err(GuardViolation::ZeroVolume);
    }
    if !params.window.is_valid() {
        return Err(GuardViolation::InvalidWindow);
    }

    let floor = bid_floor(asset, mode, min_increment)?;
    if params.bid_amount < floor {
        return Err(GuardViolation::BelowFloor {
            bid: params.bid_amount,
            floor,
        });
    }
    CostQuote::for_params(params).map(|_| ())
}

/// Cost of a bid, computed once and carried unchanged to the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostQuote {
    pub bid_amount: Money,
    pub leads_per_day: u32,
    pub total_cost: Money,
}

impl CostQuote {
    pub fn for_params(params: &BidParams) -> Result<Self, GuardViolation> {
        let total_cost = total_cost(params.bid_amount, params.leads_per_day)
            .ok_or(GuardViolation::AmountTooLarge)?;
        Ok(Self {
            bid_amount: params.bid_amount,
            leads_per_day: params.leads_per_day,
            total_cost,
        })
    }
}
