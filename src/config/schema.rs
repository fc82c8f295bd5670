//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::forecast::ServiceInfo;
use crate::resilience::FaultProfile;

/// Root configuration for the weather service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Injected latency and failures on the forecast operation.
    pub faults: FaultConfig,

    /// Metric registry and scrape endpoint.
    pub metrics: MetricsConfig,

    /// Span tracking and export.
    pub tracing: TracingConfig,

    /// Health probe settings.
    pub health: HealthConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Reported version and deployment environment.
    pub service: ServiceInfoConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Fault injection configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Disable to run without delay or failures.
    pub enabled: bool,

    /// Lower bound of the injected delay in milliseconds.
    pub min_latency_ms: u64,

    /// Upper bound of the injected delay in milliseconds.
    pub max_latency_ms: u64,

    /// Probability in [0, 1] that a forecast request fails.
    pub failure_probability: f64,

    /// Seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,

    /// Message returned with injected failures.
    pub failure_message: String,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_latency_ms: 50,
            max_latency_ms: 300,
            failure_probability: 0.05,
            seed: None,
            failure_message: "Weather service temporarily unavailable".to_string(),
        }
    }
}

impl FaultConfig {
    /// The profile the injector should run with.
    pub fn profile(&self) -> FaultProfile {
        if !self.enabled {
            return FaultProfile {
                failure_message: self.failure_message.clone(),
                ..FaultProfile::disabled()
            };
        }
        FaultProfile {
            min_latency_ms: self.min_latency_ms,
            max_latency_ms: self.max_latency_ms,
            failure_probability: self.failure_probability,
            failure_message: self.failure_message.clone(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    pub enabled: bool,

    /// Prefix for every metric name, shared by both backends.
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "weather".to_string(),
        }
    }
}

/// Span tracking configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Service name stamped on every span.
    pub service_name: String,

    /// Emit a log event for every closed span.
    pub log_spans: bool,

    /// Closed spans kept in memory for `/debug/spans`.
    pub retained_spans: usize,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "weather-api".to_string(),
            log_spans: true,
            retained_spans: 256,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// A probe running longer than this reports Unhealthy.
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2000,
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Service identity configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceInfoConfig {
    pub version: String,
    pub environment: String,
}

impl Default for ServiceInfoConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            environment: "Production".to_string(),
        }
    }
}

impl ServiceInfoConfig {
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            version: self.version.clone(),
            environment: self.environment.clone(),
        }
    }
}
