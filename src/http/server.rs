//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the registry, span tracker, fault injector, health aggregator and
//!   weather service from config
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, HTTP metrics, tracing, timeout)
//! - Apply fault profile updates from the config watcher while serving
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{validate_config, ConfigError, ServiceConfig, ValidationError};
use crate::forecast::WeatherService;
use crate::health::probes::register_builtin;
use crate::health::HealthAggregator;
use crate::http::handlers;
use crate::http::middleware::track_http_metrics;
use crate::observability::{InMemoryExporter, LogExporter, MetricRegistry, SpanTracker};
use crate::pipeline::InstrumentedPipeline;
use crate::resilience::{FaultInjector, InvalidFaultProfile};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
    pub health: Arc<HealthAggregator>,
    pub faults: Arc<FaultInjector>,
    pub spans: Arc<InMemoryExporter>,
    pub http_metrics: Arc<MetricRegistry>,
    pub prometheus: Option<PrometheusHandle>,
    pub metrics_enabled: bool,
}

/// HTTP server for the weather service.
pub struct HttpServer {
    state: AppState,
    config: ServiceConfig,
}

impl HttpServer {
    /// Validate `config` and build every subsystem from it.
    ///
    /// Install the Prometheus recorder first (and pass it through
    /// [`HttpServer::with_prometheus`]) for the metrics to reach `/metrics`.
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let metrics = Arc::new(MetricRegistry::standard(config.metrics.prefix.clone()));

        let recent = Arc::new(InMemoryExporter::new(config.tracing.retained_spans));
        let mut spans = SpanTracker::builder(config.tracing.service_name.clone())
            .version(config.service.version.clone())
            .environment(config.service.environment.clone())
            .exporter(recent.clone());
        if config.tracing.log_spans {
            spans = spans.exporter(Arc::new(LogExporter));
        }
        let spans = spans.build();

        let profile = config.faults.profile();
        let faults = match config.faults.seed {
            Some(seed) => FaultInjector::seeded(profile, seed),
            None => FaultInjector::from_entropy(profile),
        }
        .map_err(invalid_faults)?;
        let faults = Arc::new(faults);

        let pipeline = InstrumentedPipeline::new(metrics, spans).with_faults(faults.clone());
        let service = WeatherService::new(pipeline, config.service.info(), config.faults.seed);

        let health = HealthAggregator::new(config.health.probe_timeout());
        register_builtin(&health);

        let state = AppState {
            service: Arc::new(service),
            health: Arc::new(health),
            faults,
            spans: recent,
            http_metrics: Arc::new(MetricRegistry::http()),
            prometheus: None,
            metrics_enabled: config.metrics.enabled,
        };

        Ok(Self { state, config })
    }

    /// Serve `/metrics` from the installed Prometheus recorder.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.state.prometheus = Some(handle);
        self
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        });

        Router::new()
            .route("/api/weather", get(handlers::get_forecasts))
            .route("/api/weather/health", get(handlers::get_service_health))
            .route("/api/weather/metrics-demo", get(handlers::get_metrics_demo))
            .route("/health", get(handlers::get_health))
            .route("/health/ready", get(handlers::get_health))
            .route("/health/live", get(handlers::get_liveness))
            .route("/metrics", get(handlers::get_metrics))
            .route("/debug/spans", get(handlers::get_recent_spans))
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(middleware::from_fn_with_state(
                        self.state.http_metrics.clone(),
                        track_http_metrics,
                    ))
                    .layer(trace)
                    .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` swap the fault profile in place.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload = tokio::spawn(apply_config_updates(self.state.faults.clone(), config_updates));

        let app = self.router();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await;

        reload.abort();
        result?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<WeatherService> {
        &self.state.service
    }

    /// The aggregator behind `/health`; register extra probes here.
    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.state.health
    }

    pub fn faults(&self) -> &Arc<FaultInjector> {
        &self.state.faults
    }

    /// Per-route request metrics recorded by the HTTP middleware.
    pub fn http_metrics(&self) -> &Arc<MetricRegistry> {
        &self.state.http_metrics
    }
}

async fn apply_config_updates(
    faults: Arc<FaultInjector>,
    mut updates: mpsc::UnboundedReceiver<ServiceConfig>,
) {
    while let Some(config) = updates.recv().await {
        match faults.update_profile(config.faults.profile()) {
            Ok(()) => tracing::info!("Applied reloaded fault profile"),
            Err(e) => tracing::warn!(error = %e, "Rejected reloaded fault profile"),
        }
    }
    tracing::debug!("Config update channel closed");
}

fn invalid_faults(err: InvalidFaultProfile) -> ConfigError {
    ConfigError::Validation(vec![ValidationError::new("faults", err.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ServiceConfig::default();
        config.faults.failure_probability = 3.0;
        assert!(matches!(HttpServer::new(config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_builds_builtin_probes() {
        let server = HttpServer::new(ServiceConfig::default()).unwrap();
        assert_eq!(server.health().probe_names(), vec!["self", "database"]);
        assert_eq!(server.faults().profile().failure_probability, 0.05);
    }

    #[tokio::test]
    async fn test_config_updates_swap_fault_profile() {
        let server = HttpServer::new(ServiceConfig::default()).unwrap();
        let faults = server.faults().clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(apply_config_updates(faults.clone(), rx));

        let mut reloaded = ServiceConfig::default();
        reloaded.faults.failure_probability = 1.0;
        tx.send(reloaded).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(faults.profile().failure_probability, 1.0);
    }
}
