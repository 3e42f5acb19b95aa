//! Property-Based Tests — Domain and Ledger Invariants
//!
//! Uses `proptest` to verify that the entry guard, cost arithmetic and
//! local ledger hold their invariants across random inputs.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;

use lead_exchange_engine::adapters::persistence::fixtures::{self, BUYER_ID};
use lead_exchange_engine::adapters::persistence::LedgerBlob;
use lead_exchange_engine::domain::marketplace::{
    Asset, BidKind, BidRecord, DeliveryWindow, GatewayConfig, ReviewStatus,
};
use lead_exchange_engine::domain::money::{total_cost, Money};
use lead_exchange_engine::domain::pricing::{
    check_entry, BidMode, BidParams, CostQuote, GuardViolation,
};
use lead_exchange_engine::domain::settlement::charged_amount;
use lead_exchange_engine::ports::persistence::{
    AdjustmentReason, BalanceAdjustment, Operation, PersistenceError,
};

fn asset(price_minor: i64, bid_count: u32) -> Asset {
    let mut asset = fixtures::seed().assets[0].clone();
    asset.current_price = Money::from_minor_units(price_minor);
    asset.bid_count = bid_count;
    asset
}

fn params(bid_minor: i64, leads: u32) -> BidParams {
    BidParams {
        endpoint: "https://crm.example/hook".to_string(),
        contact: "buyer@example.com".to_string(),
        leads_per_day: leads,
        bid_amount: Money::from_minor_units(bid_minor),
        window: DeliveryWindow::business_hours(),
    }
}

fn record(id: &str, asset_id: &str, bid_minor: i64, leads: u32) -> BidRecord {
    let bid_amount = Money::from_minor_units(bid_minor);
    BidRecord {
        id: id.to_string(),
        asset_id: asset_id.to_string(),
        bidder_id: BUYER_ID.to_string(),
        kind: BidKind::Bid,
        bid_amount,
        leads_per_day: leads,
        total_cost: total_cost(bid_amount, leads).unwrap(),
        status: ReviewStatus::Pending,
        created_at: Utc::now(),
        delivery_endpoint: "https://crm.example/hook".to_string(),
        contact: "buyer@example.com".to_string(),
        window: DeliveryWindow::business_hours(),
        settlement_ref: None,
    }
}

fn blob_with_balance(balance_minor: i64) -> LedgerBlob {
    let mut blob = fixtures::seed();
    for user in &mut blob.users {
        if user.id == BUYER_ID {
            user.balance = Money::from_minor_units(balance_minor);
        }
    }
    blob
}

// ── Entry Guard Properties ──────────────────────────────────

proptest! {
    /// With no bids yet, anything under the current price is refused.
    #[test]
    fn auction_bid_below_price_always_rejected(
        price in 1i64..1_000_000,
        shortfall in 1i64..1_000_000,
        leads in 1u32..500,
    ) {
        let bid = price - shortfall.min(price);
        let result = check_entry(&asset(price, 0), BidMode::Auction, Money::from_major(1), &params(bid, leads));
        let refused = matches!(result, Err(GuardViolation::BelowFloor { .. }));
        prop_assert!(refused, "bid {bid} under price {price} was accepted");
    }

    /// At or above the floor, the guard accepts.
    #[test]
    fn auction_bid_at_or_above_floor_accepted(
        price in 1i64..1_000_000,
        surplus in 0i64..1_000_000,
        bid_count in 0u32..50,
        increment in 0i64..10_000,
    ) {
        let floor = if bid_count == 0 { price } else { price + increment };
        let result = check_entry(
            &asset(price, bid_count),
            BidMode::Auction,
            Money::from_minor_units(increment),
            &params(floor + surplus, 1),
        );
        prop_assert!(result.is_ok(), "bid {} at floor {floor} refused: {result:?}", floor + surplus);
    }

    /// Once an asset carries bids, matching the current price is not enough.
    #[test]
    fn auction_with_bids_requires_increment(
        price in 1i64..1_000_000,
        bid_count in 1u32..50,
        increment in 1i64..10_000,
    ) {
        let result = check_entry(
            &asset(price, bid_count),
            BidMode::Auction,
            Money::from_minor_units(increment),
            &params(price, 1),
        );
        let refused = matches!(result, Err(GuardViolation::BelowFloor { .. }));
        prop_assert!(refused);
    }

    /// Buy-now ignores the auction price and uses the quote.
    #[test]
    fn buy_now_floor_is_quote(
        price in 1i64..1_000_000,
        quoted in 1i64..1_000_000,
        bid_count in 0u32..50,
    ) {
        let mode = BidMode::BuyNow { quoted: Money::from_minor_units(quoted) };
        let a = asset(price, bid_count);
        prop_assert!(check_entry(&a, mode, Money::from_major(1), &params(quoted, 1)).is_ok());
        let below = check_entry(&a, mode, Money::from_major(1), &params(quoted - 1, 1));
        prop_assert!(
            matches!(below, Err(GuardViolation::BelowFloor { .. })),
            "bid under quote accepted"
        );
    }
}

// ── Cost Properties ─────────────────────────────────────────

proptest! {
    /// Total cost is exact in minor units, never float-approximated.
    #[test]
    fn total_cost_is_exact(
        bid in 1i64..10_000_000,
        leads in 1u32..10_000,
    ) {
        let total = total_cost(Money::from_minor_units(bid), leads).unwrap();
        prop_assert_eq!(total.to_minor_units(), Some(bid * i64::from(leads)));
    }

    /// Minor units survive parsing of their decimal rendering.
    #[test]
    fn minor_units_survive_parsing(minor in 0i64..1_000_000_000_000) {
        let text = format!("{}.{:02}", minor / 100, minor % 100);
        let parsed = Money::parse(&text).unwrap();
        prop_assert_eq!(parsed.to_minor_units(), Some(minor));
        prop_assert_eq!(parsed.to_string(), text);
    }

    /// The gross charge never undercuts the net credit.
    #[test]
    fn charge_covers_net(
        net in 1i64..100_000_000,
        fee_bp in 0i64..1_000,
    ) {
        let mut gateway: GatewayConfig = fixtures::seed().gateways[0].clone();
        gateway.fee_percent = Decimal::new(fee_bp, 2);
        let net = Money::from_minor_units(net);
        let charged = charged_amount(net, &gateway).unwrap();
        prop_assert!(charged >= net);
        if fee_bp == 0 {
            prop_assert_eq!(charged, net);
        }
    }

    /// Oversized amounts are refused, never panicking or losing cents.
    #[test]
    fn oversized_amounts_quote_exactly_or_refuse(
        major in "[1-9][0-9]{0,25}",
        cents in 0u32..100,
        leads in any::<u32>(),
    ) {
        let amount = Money::parse(&format!("{major}.{cents:02}")).unwrap();
        let mut p = params(0, leads.max(1));
        p.bid_amount = amount;

        match CostQuote::for_params(&p) {
            Ok(quote) => {
                prop_assert_eq!(quote.total_cost.as_decimal().scale(), 2);
                let expected = amount.as_decimal().checked_mul(Decimal::from(leads.max(1)));
                prop_assert_eq!(Some(quote.total_cost.as_decimal()), expected);
            }
            Err(violation) => prop_assert_eq!(violation, GuardViolation::AmountTooLarge),
        }

        let guarded = check_entry(&asset(1, 0), BidMode::Auction, Money::from_major(1), &p);
        prop_assert!(matches!(guarded, Ok(()) | Err(GuardViolation::AmountTooLarge)));
    }
}

// ── Ledger Properties ───────────────────────────────────────

proptest! {
    /// A commit either deducts exactly the total or changes nothing.
    #[test]
    fn commit_deducts_exactly_or_rejects(
        balance in 0i64..500_000,
        bid in 10_000i64..20_000,
        leads in 1u32..40,
    ) {
        let mut blob = blob_with_balance(balance);
        let before = blob.clone();
        let bid_record = record("bid-prop", "lead_solar_ca", bid, leads);
        let total = bid_record.total_cost;

        match blob.apply(&Operation::CommitBid(bid_record), 1_000) {
            Ok(_) => {
                let after = blob.users.iter().find(|u| u.id == BUYER_ID).unwrap().balance;
                prop_assert_eq!(after, Money::from_minor_units(balance).checked_sub(total).unwrap());
                prop_assert!(!after.is_negative());
                prop_assert_eq!(blob.bids.len(), 1);
            }
            Err(PersistenceError::Rejected(message)) => {
                prop_assert_eq!(message.as_str(), "Insufficient vault balance");
                prop_assert!(total > Money::from_minor_units(balance));
                prop_assert_eq!(blob, before);
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    /// Replaying a reference credits it once.
    #[test]
    fn deposit_reference_applies_once(
        amount in 1i64..10_000_000,
        replays in 1usize..5,
    ) {
        let mut blob = fixtures::seed();
        let op = Operation::AdjustBalance(BalanceAdjustment {
            user_id: BUYER_ID.to_string(),
            delta: Money::from_minor_units(amount),
            reference: "UPI_SETTLE_prop".to_string(),
            reason: AdjustmentReason::Deposit,
        });
        for i in 0..=replays {
            blob.apply(&op, 1_000 + i64::try_from(i).unwrap()).unwrap();
        }
        let balance = blob.users.iter().find(|u| u.id == BUYER_ID).unwrap().balance;
        prop_assert_eq!(balance, Money::from_major(2000).checked_add(Money::from_minor_units(amount)).unwrap());
    }

    /// The revision marker strictly increases across applied writes,
    /// whatever the clock says.
    #[test]
    fn revision_strictly_increases(clock in proptest::collection::vec(0i64..10_000, 1..20)) {
        let mut blob = fixtures::seed();
        let mut previous = blob.last_updated;
        for now in clock {
            blob.apply(&Operation::ClearLog, now).unwrap();
            prop_assert!(blob.last_updated > previous);
            previous = blob.last_updated;
        }
    }
}
