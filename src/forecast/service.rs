//! Weather service operations.
//!
//! # Operations
//! - `GetWeatherForecast`: full pipeline (faults, gauge, durations, counters)
//! - `HealthCheck`: span and request counters only
//! - `MetricsDemo`: span and a random burst of counter increments

use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::forecast::generator::{self, WeatherForecast, FORECAST_DAYS};
use crate::observability::LabelSet;
use crate::pipeline::InstrumentedPipeline;

pub mod operations {
    pub const GET_FORECAST: &str = "GetWeatherForecast";
    pub const HEALTH_CHECK: &str = "HealthCheck";
    pub const METRICS_DEMO: &str = "MetricsDemo";
}

pub mod endpoints {
    pub const FORECAST: &str = "/api/weather";
    pub const HEALTH: &str = "/api/weather/health";
    pub const METRICS_DEMO: &str = "/api/weather/metrics-demo";
}

/// Method label used by the metrics demo burst.
pub const DEMO_METHOD: &str = "DEMO";

/// Demo bursts are drawn from this range (upper bound exclusive).
const DEMO_BURST: std::ops::Range<u64> = 1..10;

/// Version and deployment environment reported by the health operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDemo {
    pub message: String,
    pub prometheus_endpoint: String,
    pub health_endpoint: String,
    pub requests_generated: u64,
}

/// Synthetic weather operations, instrumented through the pipeline.
#[derive(Debug)]
pub struct WeatherService {
    pipeline: InstrumentedPipeline,
    info: ServiceInfo,
    rng: Mutex<fastrand::Rng>,
}

impl WeatherService {
    pub fn new(pipeline: InstrumentedPipeline, info: ServiceInfo, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            pipeline,
            info,
            rng: Mutex::new(rng),
        }
    }

    pub fn pipeline(&self) -> &InstrumentedPipeline {
        &self.pipeline
    }

    /// Five forecasts starting tomorrow, or the injected fault.
    pub async fn forecasts(&self) -> Result<Vec<WeatherForecast>> {
        self.forecasts_from(Utc::now().date_naive()).await
    }

    pub async fn forecasts_from(&self, today: NaiveDate) -> Result<Vec<WeatherForecast>> {
        let labels = LabelSet::request("GET", endpoints::FORECAST);
        self.pipeline
            .run(operations::GET_FORECAST, &labels, || async move {
                tracing::info!("Processing weather forecast request");
                let forecasts = {
                    let mut rng = self.rng.lock().expect("forecast rng mutex poisoned");
                    generator::generate(&mut rng, today, FORECAST_DAYS)
                };
                tracing::info!(count = forecasts.len(), "Generated weather forecasts");
                Ok(forecasts)
            })
            .await
    }

    pub fn health_check(&self) -> ServiceHealth {
        let mut span = self.pipeline.spans().start_span(operations::HEALTH_CHECK);
        self.pipeline
            .count_request(&LabelSet::request("GET", endpoints::HEALTH), 1);

        let health = ServiceHealth {
            status: "Healthy".to_string(),
            timestamp: Utc::now(),
            version: self.info.version.clone(),
            environment: self.info.environment.clone(),
        };

        span.set_tag("health.status", health.status.as_str());
        span.set_ok();
        tracing::info!(status = %health.status, "Health check requested");
        health
    }

    /// Increment the request counters a random 1 to 9 times.
    pub fn metrics_demo(&self) -> MetricsDemo {
        let mut span = self.pipeline.spans().start_span(operations::METRICS_DEMO);
        let burst = self
            .rng
            .lock()
            .expect("forecast rng mutex poisoned")
            .u64(DEMO_BURST);

        self.pipeline
            .count_request(&LabelSet::request(DEMO_METHOD, endpoints::METRICS_DEMO), burst);

        span.set_tag("demo.requests", burst);
        span.set_ok();
        tracing::info!(requests = burst, "Metrics demo endpoint called");

        MetricsDemo {
            message: "Metrics demonstration endpoint".to_string(),
            prometheus_endpoint: "/metrics".to_string(),
            health_endpoint: "/health".to_string(),
            requests_generated: burst,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::observability::metrics::names;
    use crate::observability::{InMemoryExporter, MetricRegistry, SpanStatus, SpanTracker, TagValue};
    use crate::resilience::{FaultInjector, FaultProfile};

    fn service(profile: FaultProfile) -> (WeatherService, Arc<InMemoryExporter>) {
        let buffer = Arc::new(InMemoryExporter::new(64));
        let spans = SpanTracker::builder("weather-test").exporter(buffer.clone()).build();
        let metrics = Arc::new(MetricRegistry::standard("weather"));
        let faults = Arc::new(FaultInjector::seeded(profile, 11).unwrap());
        let pipeline = InstrumentedPipeline::new(metrics, spans).with_faults(faults);
        let info = ServiceInfo {
            version: "1.0.0".into(),
            environment: "Testing".into(),
        };
        (WeatherService::new(pipeline, info, Some(3)), buffer)
    }

    #[tokio::test]
    async fn test_forecasts_are_counted_and_tagged() {
        let (service, buffer) = service(FaultProfile::disabled());

        let forecasts = service.forecasts().await.unwrap();
        assert_eq!(forecasts.len(), 5);

        let labels = LabelSet::request("GET", endpoints::FORECAST);
        let metrics = service.pipeline().metrics();
        assert_eq!(metrics.counter(names::REQUESTS_TOTAL, &labels).get(), 1);
        assert_eq!(metrics.counter(names::SECONDARY_REQUESTS_TOTAL, &labels).get(), 1);

        let span = &buffer.named(operations::GET_FORECAST)[0];
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.tag("count"), Some(&TagValue::Int(5)));
    }

    #[tokio::test]
    async fn test_forecast_fault_surfaces_as_error() {
        let profile = FaultProfile {
            failure_probability: 1.0,
            failure_message: "Weather service temporarily unavailable".into(),
            ..FaultProfile::disabled()
        };
        let (service, buffer) = service(profile);

        let err = service.forecasts().await.unwrap_err();
        assert!(err.is_injected_fault());
        assert_eq!(err.to_string(), "Weather service temporarily unavailable");

        let labels = LabelSet::request("GET", endpoints::FORECAST);
        let metrics = service.pipeline().metrics();
        assert_eq!(metrics.counter(names::REQUEST_ERRORS_TOTAL, &labels).get(), 1);
        assert!(buffer.named(operations::GET_FORECAST)[0].status.is_error());
    }

    #[test]
    fn test_health_check_counts_without_gauge() {
        let (service, buffer) = service(FaultProfile::disabled());

        let health = service.health_check();
        assert_eq!(health.status, "Healthy");
        assert_eq!(health.environment, "Testing");

        let labels = LabelSet::request("GET", endpoints::HEALTH);
        let metrics = service.pipeline().metrics();
        assert_eq!(metrics.counter(names::REQUESTS_TOTAL, &labels).get(), 1);
        assert_eq!(metrics.gauge(names::ACTIVE_REQUESTS, &LabelSet::new()).get(), 0);
        assert_eq!(buffer.named(operations::HEALTH_CHECK).len(), 1);
    }

    #[test]
    fn test_metrics_demo_burst_hits_both_backends() {
        let (service, buffer) = service(FaultProfile::disabled());

        let demo = service.metrics_demo();
        assert!((1..10).contains(&demo.requests_generated));

        let labels = LabelSet::request(DEMO_METHOD, endpoints::METRICS_DEMO);
        let metrics = service.pipeline().metrics();
        assert_eq!(metrics.counter(names::REQUESTS_TOTAL, &labels).get(), demo.requests_generated);
        assert_eq!(
            metrics.counter(names::SECONDARY_REQUESTS_TOTAL, &labels).get(),
            demo.requests_generated
        );
        assert_eq!(buffer.named(operations::METRICS_DEMO)[0].status, SpanStatus::Ok);
    }
}
