//! Prometheus metrics for the device ledger.
//!
//! # Usage
//!
//! ```rust,ignore
//! use coinjar_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: `ledger_`
//! - Suffix: `_total` for counters
//! - Labels: `op` (increment/reset) and `reason` (error kind) only

use std::net::SocketAddr;

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if a recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_ledger_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_ledger_metrics();
    Some(handle)
}

/// Serve `/metrics` on the given port.
///
/// Binds before returning so that a taken port is reported to the caller;
/// the server itself runs on a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(())
}

fn register_ledger_metrics() {
    describe_counter!(
        "ledger_mutations_total",
        "Mutations applied to device ledgers (label: op)"
    );
    describe_counter!(
        "ledger_rejections_total",
        "Mutations rejected before reaching the store (label: reason)"
    );
    describe_counter!(
        "ledger_replays_total",
        "Mutations answered from the request id window without being applied (label: op)"
    );
    describe_gauge!("ledger_devices", "Number of devices with a ledger record");
}

// =============================================================================
// Metric Recording Helpers
// =============================================================================

/// Record an applied mutation and the current device count.
pub fn record_mutation(op: &'static str, devices: usize) {
    metrics::counter!("ledger_mutations_total", "op" => op).increment(1);
    metrics::gauge!("ledger_devices").set(devices as f64);
}

/// Record a rejected mutation.
#[inline]
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("ledger_rejections_total", "reason" => reason).increment(1);
}

/// Record a replayed mutation.
#[inline]
pub fn record_replay(op: &'static str) {
    metrics::counter!("ledger_replays_total", "op" => op).increment(1);
}
