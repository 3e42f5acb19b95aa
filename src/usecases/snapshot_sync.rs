//! Snapshot Sync - Polling Reconciliation
//!
//! Polls the store for the full data snapshot on a fixed interval and
//! publishes it on a watch channel, but only when its `last_updated`
//! marker is strictly newer than the last one adopted. Workflows read
//! balances and gateways from the channel; this task never touches
//! workflow state.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::domain::marketplace::MarketSnapshot;
use crate::ports::persistence::{LedgerStore, PersistenceError};

/// Revision value before any snapshot is adopted.
const NO_REVISION: i64 = i64::MIN;

pub struct SnapshotSync<L: LedgerStore> {
  store: Arc<L>,
  tx: watch::Sender<Arc<MarketSnapshot>>,
  poll_interval: Duration,
  adopted: AtomicI64,
}

impl<L: LedgerStore> SnapshotSync<L> {
  pub fn new(store: Arc<L>, poll_interval: Duration) -> Self {
    let (tx, _rx) = watch::channel(Arc::new(MarketSnapshot::default()));
    Self {
      store,
      tx,
      poll_interval,
      adopted: AtomicI64::new(NO_REVISION),
    }
  }

  /// Receiver of adopted snapshots.
  pub fn subscribe(&self) -> watch::Receiver<Arc<MarketSnapshot>> {
    self.tx.subscribe()
  }

  /// Revision marker of the last adopted snapshot, if any.
  pub fn revision(&self) -> Option<i64> {
    let rev = self.adopted.load(Ordering::Acquire);
    (rev != NO_REVISION).then_some(rev)
  }

  /// Fetch once. Returns whether the snapshot was adopted.
  pub async fn refresh(&self) -> Result<bool, PersistenceError> {
    let snapshot = self.store.snapshot().await?;
    Ok(self.offer(snapshot))
  }

  /// Adopt `snapshot` if its marker advanced.
  pub fn offer(&self, snapshot: MarketSnapshot) -> bool {
    let previous = self.adopted.load(Ordering::Acquire);
    if previous != NO_REVISION && snapshot.last_updated <= previous {
      debug!(revision = snapshot.last_updated, "Snapshot unchanged, skipped");
      return false;
    }
    self.adopted.store(snapshot.last_updated, Ordering::Release);
    self.tx.send_replace(Arc::new(snapshot));
    true
  }

  /// Poll until shutdown.
  #[instrument(skip_all, name = "snapshot_sync")]
  pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    info!(interval_ms = self.poll_interval.as_millis(), "Snapshot sync started");

    let mut ticker = interval(self.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal received, stopping snapshot sync");
          break;
        }
        _ = ticker.tick() => {
          match self.refresh().await {
            Ok(true) => debug!(revision = ?self.revision(), mode = ?self.store.mode(), "Snapshot adopted"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Snapshot refresh failed"),
          }
        }
      }
    }

    Ok(())
  }
}
