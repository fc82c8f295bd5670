//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, probability in [0, 1])
//! - Check that the metric prefix is a valid Prometheus name
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// A single rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let faults = &config.faults;
    if faults.min_latency_ms > faults.max_latency_ms {
        errors.push(ValidationError::new(
            "faults.min_latency_ms",
            format!(
                "must not exceed faults.max_latency_ms ({} > {})",
                faults.min_latency_ms, faults.max_latency_ms
            ),
        ));
    }
    if !(0.0..=1.0).contains(&faults.failure_probability) {
        errors.push(ValidationError::new(
            "faults.failure_probability",
            format!("{} is outside [0, 1]", faults.failure_probability),
        ));
    }

    if !is_metric_name(&config.metrics.prefix) {
        errors.push(ValidationError::new(
            "metrics.prefix",
            format!("`{}` is not a valid metric name prefix", config.metrics.prefix),
        ));
    }

    if config.tracing.service_name.trim().is_empty() {
        errors.push(ValidationError::new("tracing.service_name", "must not be empty"));
    }
    if config.tracing.retained_spans == 0 {
        errors.push(ValidationError::new("tracing.retained_spans", "must be greater than 0"));
    }

    if config.health.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("health.probe_timeout_ms", "must be greater than 0"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("`{}` is not one of {}", config.observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
