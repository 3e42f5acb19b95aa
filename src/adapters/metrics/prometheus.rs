//! Prometheus Metrics Registry - Marketplace Observability
//!
//! Registers and exposes Prometheus metrics on :9090. Covers snapshot
//! freshness, record counts and the store mode.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

/// Centralized Prometheus metrics for the engine.
///
/// All metrics follow the naming convention `lead_exchange_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Revision marker of the last adopted snapshot (Unix ms).
    pub snapshot_revision: IntGauge,
    /// Snapshots adopted because their revision advanced.
    pub snapshots_adopted: IntCounter,
    /// Record counts in the last adopted snapshot, by kind.
    pub records: IntGaugeVec,
    /// Store mode (1 = local fallback, 0 = remote).
    pub store_fallback_active: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let snapshot_revision = IntGauge::new(
            "lead_exchange_snapshot_revision",
            "Revision marker of the last adopted snapshot",
        )?;

        let snapshots_adopted = IntCounter::new(
            "lead_exchange_snapshots_adopted_total",
            "Snapshots adopted after the revision marker advanced",
        )?;

        let records = IntGaugeVec::new(
            Opts::new(
                "lead_exchange_snapshot_records",
                "Record counts in the last adopted snapshot",
            ),
            &["kind"],
        )?;

        let store_fallback_active = IntGauge::new(
            "lead_exchange_store_fallback_active",
            "Whether the local fallback store is serving (1=yes, 0=no)",
        )?;

        registry.register(Box::new(snapshot_revision.clone()))?;
        registry.register(Box::new(snapshots_adopted.clone()))?;
        registry.register(Box::new(records.clone()))?;
        registry.register(Box::new(store_fallback_active.clone()))?;

        Ok(Self {
            registry,
            snapshot_revision,
            snapshots_adopted,
            records,
            store_fallback_active,
        })
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    metrics.render().map_err(|e| {
                        error!(error = %e, "Failed to encode metrics");
                        StatusCode::INTERNAL_SERVER_ERROR
                    })
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.snapshot_revision.set(42);
        metrics.records.with_label_values(&["bids"]).set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("lead_exchange_snapshot_revision 42"));
        assert!(text.contains(r#"lead_exchange_snapshot_records{kind="bids"} 3"#));
    }
}
