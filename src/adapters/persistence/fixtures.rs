//! Seed data for a fresh local ledger.
//!
//! Written on first use of fallback mode so the marketplace is usable
//! without any backend deployed.

use rust_decimal_macros::dec;

use super::local_store::LedgerBlob;
use crate::domain::marketplace::{
    AccountStatus, Asset, GatewayConfig, GatewayStatus, ReviewStatus, Role, User,
};
use crate::domain::money::Money;

/// Id of the seeded administrator.
pub const ADMIN_ID: &str = "u_admin";
/// Id of the seeded buyer.
pub const BUYER_ID: &str = "u_buyer";
/// Id of the seeded seller.
pub const SELLER_ID: &str = "u_seller";

/// Build the seed ledger.
pub fn seed() -> LedgerBlob {
    let assets = vec![
        asset("lead_solar_ca", "Residential solar, California", "energy", 100, 82),
        asset("lead_auto_tx", "Auto insurance, Texas", "insurance", 45, 74),
        asset("lead_mortgage_fl", "Mortgage refinance, Florida", "finance", 160, 90),
    ];

    let users = vec![
        User {
            id: ADMIN_ID.to_string(),
            name: "Marketplace Admin".to_string(),
            role: Role::Admin,
            balance: Money::ZERO,
            status: AccountStatus::Active,
        },
        User {
            id: BUYER_ID.to_string(),
            name: "Demo Buyer".to_string(),
            role: Role::User,
            balance: Money::from_major(2000),
            status: AccountStatus::Active,
        },
        User {
            id: SELLER_ID.to_string(),
            name: "Demo Seller".to_string(),
            role: Role::User,
            balance: Money::ZERO,
            status: AccountStatus::Active,
        },
    ];

    let gateways = vec![
        GatewayConfig {
            id: "gw_stripe".to_string(),
            name: "Card".to_string(),
            provider: "stripe".to_string(),
            public_key: "pk_test_placeholder".to_string(),
            secret_key: String::new(),
            fee_percent: dec!(2.9),
            status: GatewayStatus::Active,
        },
        GatewayConfig {
            id: "gw_upi".to_string(),
            name: "UPI / QR".to_string(),
            provider: "upi".to_string(),
            public_key: "merchant@upi".to_string(),
            secret_key: String::new(),
            fee_percent: dec!(0),
            status: GatewayStatus::Active,
        },
        GatewayConfig {
            id: "gw_crypto".to_string(),
            name: "USDT (TRC20)".to_string(),
            provider: "crypto".to_string(),
            public_key: String::new(),
            secret_key: String::new(),
            fee_percent: dec!(1),
            status: GatewayStatus::Inactive,
        },
    ];

    LedgerBlob {
        assets,
        users,
        gateways,
        ..LedgerBlob::default()
    }
}

fn asset(id: &str, title: &str, category: &str, price: i64, quality: u8) -> Asset {
    Asset {
        id: id.to_string(),
        title: title.to_string(),
        category: category.to_string(),
        current_price: Money::from_major(price),
        bid_count: 0,
        quality_score: quality,
        status: ReviewStatus::Approved,
        owner_id: SELLER_ID.to_string(),
    }
}
