//! Health probe aggregation.
//!
//! # Responsibilities
//! - Keep the set of named probes
//! - Run every probe independently and concurrently on each evaluation
//! - Reduce the results to the worst status, keeping the full breakdown
//!
//! # Design Decisions
//! - Probe errors, panics and timeouts become `Unhealthy` outcomes; nothing
//!   a probe does can fail the evaluation itself
//! - The probe list lock is released before any probe runs

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tower::BoxError;

use crate::health::status::{HealthStatus, ProbeResult};

type ProbeFn = Arc<dyn Fn() -> BoxFuture<'static, Result<ProbeResult, BoxError>> + Send + Sync>;

/// Why a probe produced no result of its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("{0}")]
    Error(String),

    #[error("probe panicked: {0}")]
    Panicked(String),

    #[error("probe timed out after {0:?}")]
    TimedOut(Duration),
}

/// Result of one probe within a report.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub duration_ms: f64,
}

/// Aggregated result of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<ProbeOutcome>,
    pub total_duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn check(&self, name: &str) -> Option<&ProbeOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Runs registered probes and reduces them to an overall status.
pub struct HealthAggregator {
    probes: RwLock<Vec<(String, ProbeFn)>>,
    probe_timeout: Duration,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("probes", &self.probe_names())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl HealthAggregator {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            probes: RwLock::new(Vec::new()),
            probe_timeout,
        }
    }

    /// Register an async probe. A probe with the same name is replaced in place.
    pub fn register<F, Fut, E>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeResult, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let probe = Arc::new(probe);
        let wrapped: ProbeFn = Arc::new(move || {
            let probe = probe.clone();
            Box::pin(async move { probe().await.map_err(Into::into) })
        });
        self.insert(name.into(), wrapped);
    }

    /// Register a synchronous probe.
    pub fn register_fn<F, E>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> Result<ProbeResult, E> + Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        let probe = Arc::new(probe);
        let wrapped: ProbeFn = Arc::new(move || {
            let probe = probe.clone();
            Box::pin(async move { probe().map_err(Into::into) })
        });
        self.insert(name.into(), wrapped);
    }

    fn insert(&self, name: String, probe: ProbeFn) {
        let mut probes = self.probes.write().expect("health probe lock poisoned");
        match probes.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = probe,
            None => probes.push((name, probe)),
        }
    }

    pub fn probe_names(&self) -> Vec<String> {
        let probes = self.probes.read().expect("health probe lock poisoned");
        probes.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Run every probe and aggregate. Outcomes keep registration order.
    pub async fn evaluate(&self) -> HealthReport {
        let probes: Vec<(String, ProbeFn)> = self
            .probes
            .read()
            .expect("health probe lock poisoned")
            .clone();

        let started = Instant::now();
        let checks = join_all(
            probes
                .into_iter()
                .map(|(name, probe)| self.run_probe(name, probe)),
        )
        .await;

        let report = HealthReport {
            status: HealthStatus::worst(checks.iter().map(|c| c.status)),
            checks,
            total_duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        };

        tracing::info!(
            status = %report.status,
            probes = report.checks.len(),
            "Health check evaluated"
        );
        report
    }

    async fn run_probe(&self, name: String, probe: ProbeFn) -> ProbeOutcome {
        let started = Instant::now();
        let guarded = AssertUnwindSafe(probe()).catch_unwind();

        let result = match tokio::time::timeout(self.probe_timeout, guarded).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(err))) => Err(ProbeFailure::Error(err.to_string())),
            Ok(Err(payload)) => Err(ProbeFailure::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(ProbeFailure::TimedOut(self.probe_timeout)),
        };

        let (status, description) = match result {
            Ok(result) => (result.status, result.description),
            Err(failure) => {
                tracing::warn!(probe = %name, error = %failure, "Health probe failed");
                (HealthStatus::Unhealthy, Some(failure.to_string()))
            }
        };

        ProbeOutcome {
            name,
            status,
            description,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_worst_status_with_breakdown() {
        let health = HealthAggregator::new(Duration::from_secs(1));
        health.register_fn("a", || Ok::<_, BoxError>(ProbeResult::healthy()));
        health.register_fn("b", || Ok::<_, BoxError>(ProbeResult::unhealthy("down")));

        let report = health.evaluate().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.check("a").unwrap().status, HealthStatus::Healthy);
        assert_eq!(report.check("b").unwrap().status, HealthStatus::Unhealthy);
        assert_eq!(report.check("b").unwrap().description.as_deref(), Some("down"));
    }

    #[tokio::test]
    async fn test_no_probes_is_healthy() {
        let health = HealthAggregator::new(Duration::from_secs(1));
        let report = health.evaluate().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.checks.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_outranks_healthy() {
        let health = HealthAggregator::new(Duration::from_secs(1));
        health.register_fn("a", || Ok::<_, BoxError>(ProbeResult::healthy()));
        health.register("b", || async { Ok::<_, BoxError>(ProbeResult::degraded("slow")) });
        assert_eq!(health.evaluate().await.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_erroring_probe_does_not_stop_others() {
        let health = HealthAggregator::new(Duration::from_secs(1));
        let ran = Arc::new(AtomicBool::new(false));

        health.register_fn("broken", || Err::<ProbeResult, _>("connection refused"));
        let flag = ran.clone();
        health.register_fn("after", move || {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, BoxError>(ProbeResult::healthy())
        });

        let report = health.evaluate().await;
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(report.status, HealthStatus::Unhealthy);
        let broken = report.check("broken").unwrap();
        assert_eq!(broken.status, HealthStatus::Unhealthy);
        assert_eq!(broken.description.as_deref(), Some("connection refused"));
        assert_eq!(report.check("after").unwrap().status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_panicking_probe_is_contained() {
        let health = HealthAggregator::new(Duration::from_secs(1));
        health.register_fn("explodes", || -> Result<ProbeResult, BoxError> {
            panic!("probe exploded")
        });
        health.register_fn("fine", || Ok::<_, BoxError>(ProbeResult::healthy()));

        let report = health.evaluate().await;
        let explodes = report.check("explodes").unwrap();
        assert_eq!(explodes.status, HealthStatus::Unhealthy);
        assert_eq!(explodes.description.as_deref(), Some("probe panicked: probe exploded"));
        assert_eq!(report.check("fine").unwrap().status, HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out() {
        let health = HealthAggregator::new(Duration::from_millis(100));
        health.register("slow", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, BoxError>(ProbeResult::healthy())
        });

        let report = health.evaluate().await;
        let slow = report.check("slow").unwrap();
        assert_eq!(slow.status, HealthStatus::Unhealthy);
        assert!(slow.description.as_deref().unwrap().starts_with("probe timed out"));
    }

    #[tokio::test]
    async fn test_reregistering_replaces_probe() {
        let health = HealthAggregator::new(Duration::from_secs(1));
        health.register_fn("db", || Ok::<_, BoxError>(ProbeResult::unhealthy("down")));
        health.register_fn("cache", || Ok::<_, BoxError>(ProbeResult::healthy()));
        health.register_fn("db", || Ok::<_, BoxError>(ProbeResult::healthy()));

        assert_eq!(health.probe_names(), vec!["db", "cache"]);
        assert_eq!(health.evaluate().await.status, HealthStatus::Healthy);
    }
}
