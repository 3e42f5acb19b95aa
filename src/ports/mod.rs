//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `persistence`: Remote data service and the dual-mode ledger facade
//! - `payment`: Settlement backend, card network SDK, settlement contract

pub mod payment;
pub mod persistence;
