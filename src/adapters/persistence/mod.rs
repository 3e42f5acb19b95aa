//! Persistence Adapters - Remote Store with Local JSON Fallback
//!
//! Implements the `LedgerStore` port. Operations go to the remote data
//! service until it proves unreachable, then to a single local JSON blob
//! for the rest of the session.

pub mod fixtures;
pub mod gateway;
pub mod local_store;

pub use gateway::PersistenceGateway;
pub use local_store::{LedgerBlob, LocalStore};
