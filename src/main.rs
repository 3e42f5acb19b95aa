//! Lead Exchange Engine - Entry Point
//!
//! Headless daemon hosting the marketplace core: keeps the data
//! snapshot in sync, exposes metrics and health probes, and owns the
//! persistence and payment wiring the workflows run on.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Load request-signing credentials from env (LEADX_API_KEY, LEADX_API_SECRET)
//! 4. Create RemoteClient (HTTP + signing + retry + rate limit)
//! 5. Create PersistenceGateway (remote, latching to the local ledger)
//! 6. Create SettlementEngine (settlement backend + card network)
//! 7. Resolve the presence hint (bounded, best effort)
//! 8. Spawn SnapshotSync and the snapshot observer
//! 9. Spawn metrics (:9090) and health (/live + /ready) servers
//! 10. Wait for SIGINT → broadcast shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use lead_exchange_engine::adapters::api::auth::RequestSigner;
use lead_exchange_engine::adapters::api::{RemoteClient, RemoteClientConfig};
use lead_exchange_engine::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use lead_exchange_engine::adapters::payments::{HttpSettlementBackend, StripeCardNetwork};
use lead_exchange_engine::adapters::persistence::{LocalStore, PersistenceGateway};
use lead_exchange_engine::adapters::presence::PresenceLocator;
use lead_exchange_engine::config;
use lead_exchange_engine::domain::marketplace::MarketSnapshot;
use lead_exchange_engine::ports::payment::PaymentGateway;
use lead_exchange_engine::ports::persistence::{LedgerStore, StoreMode};
use lead_exchange_engine::usecases::{SettlementEngine, SnapshotSync};

type Store = PersistenceGateway<RemoteClient>;
type Payments = SettlementEngine<HttpSettlementBackend, StripeCardNetwork>;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::var("LEADX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.engine.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.engine.name,
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.api.base_url,
        min_increment = %config.workflow.min_increment(),
        "Starting Lead Exchange Engine"
    );

    // ── 3. Shutdown channel ─────────────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Remote client, signed when credentials are present ─
    let signer = RequestSigner::from_env().map(Arc::new);
    if signer.is_none() {
        warn!("LEADX_API_KEY / LEADX_API_SECRET not set, remote requests go out unsigned");
    }
    let remote = Arc::new(
        RemoteClient::new(signer, RemoteClientConfig::from(&config.api))
            .context("Failed to create remote client")?,
    );

    // ── 5. Persistence gateway with local fallback ──────────
    let local = LocalStore::open(&config.persistence.fallback_path)
        .await
        .context("Failed to open local ledger")?;
    let store: Arc<Store> = Arc::new(PersistenceGateway::new(Arc::clone(&remote), local));

    // ── 6. Settlement engine ────────────────────────────────
    let card = StripeCardNetwork::new(
        config.payments.card_api_base.clone(),
        Duration::from_millis(config.api.timeout_ms),
    )
    .context("Failed to create card network client")?;
    let payments: Arc<Payments> = Arc::new(SettlementEngine::new(
        Arc::new(HttpSettlementBackend::new(Arc::clone(&remote))),
        Arc::new(card),
    ));

    // ── 7. Presence hint ────────────────────────────────────
    let presence = PresenceLocator::new(&config.presence)?;
    let location = presence.resolve().await;
    info!(%location, "Presence resolved");

    // ── 8. Snapshot sync + observer ─────────────────────────
    let sync = Arc::new(SnapshotSync::new(
        Arc::clone(&store),
        Duration::from_millis(config.persistence.poll_interval_ms),
    ));
    let health = Arc::new(HealthState::new());
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);

    let sync_handle = tokio::spawn({
        let sync = Arc::clone(&sync);
        let shutdown = shutdown_tx.subscribe();
        async move {
            if let Err(e) = sync.run(shutdown).await {
                error!(error = %e, "Snapshot sync failed");
            }
        }
    });

    let observer_handle = tokio::spawn(observe_snapshots(
        sync.subscribe(),
        Arc::clone(&store),
        Arc::clone(&payments),
        Arc::clone(&metrics),
        Arc::clone(&health),
        shutdown_tx.subscribe(),
    ));

    // ── 9. Metrics + health servers ─────────────────────────
    let metrics_handle = if config.metrics.enabled {
        let bind = config.metrics.bind_address.clone();
        let shutdown = shutdown_tx.subscribe();
        let metrics = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("All tasks spawned, engine is running");

    // ── 10. Wait for SIGINT ─────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    let _ = shutdown_tx.send(());
    health.snapshot_loaded.store(false, Ordering::Relaxed);

    let _ = tokio::time::timeout(Duration::from_secs(10), sync_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), observer_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;

    info!(mode = ?store.mode(), "Shutdown complete");
    Ok(())
}

/// Mirror adopted snapshots into metrics and readiness, and flag
/// gateways the settlement engine would refuse.
async fn observe_snapshots(
    mut snapshots: watch::Receiver<Arc<MarketSnapshot>>,
    store: Arc<Store>,
    payments: Arc<Payments>,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&snapshots.borrow_and_update());

                let fallback = store.mode() == StoreMode::Fallback;
                metrics.snapshot_revision.set(snapshot.last_updated);
                metrics.snapshots_adopted.inc();
                metrics.store_fallback_active.set(i64::from(fallback));
                for (kind, count) in [
                    ("assets", snapshot.assets.len()),
                    ("bids", snapshot.bids.len()),
                    ("users", snapshot.users.len()),
                    ("gateways", snapshot.gateways.len()),
                    ("logs", snapshot.logs.len()),
                ] {
                    metrics
                        .records
                        .with_label_values(&[kind])
                        .set(i64::try_from(count).unwrap_or(i64::MAX));
                }

                health.fallback_active.store(fallback, Ordering::Relaxed);
                health.snapshot_loaded.store(true, Ordering::Relaxed);

                for gateway in snapshot.active_gateways() {
                    if let Err(e) = payments.validate(&gateway) {
                        warn!(gateway = %gateway.id, reason = %e, "Active gateway cannot settle");
                    }
                }
            }
        }
    }
}
