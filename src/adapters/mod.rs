//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, file I/O). Each sub-module
//! groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: action-addressed remote data service client and signing
//! - `metrics`: Prometheus metrics export and health checks
//! - `payments`: settlement backend and card network clients
//! - `persistence`: latching remote/local ledger gateway
//! - `presence`: best-effort location hint lookup

pub mod api;
pub mod metrics;
pub mod payments;
pub mod persistence;
pub mod presence;
