//! Domain layer - Core marketplace types and rules.
//!
//! Pure types and functions with no I/O (hexagonal architecture inner
//! ring): exact money, marketplace records, settlement types and the bid
//! entry guard. Everything here is serializable and testable in isolation.

pub mod marketplace;
pub mod money;
pub mod pricing;
pub mod settlement;

// Re-export core types for convenience
pub use marketplace::{
    AccountStatus, Actor, Asset, AuditEntry, BidKind, BidRecord, DeliveryWindow, GatewayConfig,
    GatewayStatus, MarketSnapshot, OperatingDay, ReviewStatus, Role, User,
};
pub use money::Money;
pub use pricing::{BidMode, BidParams, CostQuote};
pub use settlement::{
    IntentState, SettlementChannel, SettlementIntent, SettlementProof, SettlementReceipt,
    SettlementRef,
};
