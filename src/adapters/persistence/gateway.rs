//! Persistence Gateway - Remote Store with a Latching Local Fallback
//!
//! Routes every logical operation to the remote data service until the
//! first transport-class failure (unreachable, or 404 "no backend
//! deployed"). At that point the gateway flips to the local ledger for
//! the rest of the process lifetime and serves the failed operation
//! locally as well. The remote endpoint is never contacted again.
//!
//! All routing goes through `route()`/`latch_fallback()`; no other code
//! path decides which store serves a call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::local_store::LocalStore;
use crate::domain::marketplace::MarketSnapshot;
use crate::ports::persistence::{
    LedgerStore, Operation, PersistenceError, RemoteBackend, StoreMode,
};

/// Dual-mode store facade used by every workflow.
pub struct PersistenceGateway<R: RemoteBackend> {
    remote: Arc<R>,
    local: LocalStore,
    /// Set once, never cleared.
    fallback: AtomicBool,
}

impl<R: RemoteBackend> PersistenceGateway<R> {
    /// Create a gateway in remote mode.
    pub fn new(remote: Arc<R>, local: LocalStore) -> Self {
        Self {
            remote,
            local,
            fallback: AtomicBool::new(false),
        }
    }

    /// Create a gateway that starts (and stays) in fallback mode.
    pub fn local_only(remote: Arc<R>, local: LocalStore) -> Self {
        Self {
            remote,
            local,
            fallback: AtomicBool::new(true),
        }
    }

    /// The local ledger behind fallback mode.
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    fn route(&self) -> StoreMode {
        if self.fallback.load(Ordering::Acquire) {
            StoreMode::Fallback
        } else {
            StoreMode::Remote
        }
    }

    /// Decide whether `err` flips the gateway. Returns true if the call
    /// should be re-served locally.
    fn latch_fallback(&self, err: &PersistenceError) -> bool {
        if !err.triggers_fallback() {
            return false;
        }
        if self
            .fallback
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!(
                error = %err,
                ledger = %self.local.path().display(),
                "Remote store unavailable, switching to local ledger for this session"
            );
        }
        true
    }
}

#[async_trait]
impl<R: RemoteBackend> LedgerStore for PersistenceGateway<R> {
    async fn call(&self, op: &Operation) -> Result<Value, PersistenceError> {
        if self.route() == StoreMode::Remote {
            let payload = op.payload()?;
            match self.remote.call(op.action(), &payload).await {
                Ok(value) => return Ok(value),
                Err(e) if self.latch_fallback(&e) => {
                    debug!(action = op.action(), "Re-serving operation from local ledger");
                }
                Err(e) => return Err(e),
            }
        }
        self.local.apply(op).await
    }

    async fn snapshot(&self) -> Result<MarketSnapshot, PersistenceError> {
        if self.route() == StoreMode::Remote {
            match self.remote.fetch_snapshot().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if self.latch_fallback(&e) => {}
                Err(e) => return Err(e),
            }
        }
        self.local.snapshot().await
    }

    fn mode(&self) -> StoreMode {
        self.route()
    }
}
