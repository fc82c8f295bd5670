//! Prometheus exposition.
//!
//! Installs the process-wide `metrics` recorder that the registry mirrors
//! into. The returned handle renders the scrape body for `GET /metrics`.

use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::sync::broadcast;

use crate::observability::metrics::{MILLIS_BUCKETS, SECONDS_BUCKETS};

/// How often histogram upkeep runs on the installed recorder.
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Must run before any [`MetricRegistry`](crate::observability::MetricRegistry)
/// is built, otherwise that registry only updates its in-process values.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), SECONDS_BUCKETS)?
        .set_buckets_for_metric(Matcher::Suffix("_ms".to_string()), MILLIS_BUCKETS)?
        .install_recorder()?;

    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

/// Periodically drain histogram samples until shutdown.
pub async fn run_upkeep(handle: PrometheusHandle, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(UPKEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => handle.run_upkeep(),
            _ = shutdown.recv() => {
                tracing::debug!("Metrics upkeep received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
