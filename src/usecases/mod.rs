//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! engine's workflows. Each use case is a self-contained business
//! operation.
//!
//! Use cases:
//! - `SettlementEngine`: the payment gateway contract over card and manual channels
//! - `BidWorkflow`: bid/purchase placement with optional bridging
//! - `WalletFunding`: direct vault deposits
//! - `SnapshotSync`: polling reconciliation of the data snapshot
//! - `AdminConsole`: moderation and ledger corrections

pub mod admin;
pub mod bid_workflow;
pub mod settlement;
pub mod snapshot_sync;
pub mod wallet_funding;

pub use admin::{AdminConsole, AdminError};
pub use bid_workflow::{BidStage, BidWorkflow, WorkflowError};
pub use settlement::SettlementEngine;
pub use snapshot_sync::SnapshotSync;
pub use wallet_funding::{FundingStage, WalletFunding};
