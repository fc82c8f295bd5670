//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{LogFormat, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "WEATHER_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate a TOML document.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load a file (or defaults when `path` is `None`), apply `vars` as
/// overrides, then validate the result.
pub fn load_with_env<I, K, V>(path: Option<&Path>, vars: I) -> Result<ServiceConfig, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut config: ServiceConfig = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => ServiceConfig::default(),
    };
    apply_env_overrides(&mut config, vars)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `WEATHER_*` overrides. Unknown keys are ignored; every value that
/// fails to parse is reported.
pub fn apply_env_overrides<I, K, V>(config: &mut ServiceConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut errors = Vec::new();

    for (key, value) in vars {
        let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let value = value.as_ref().trim();

        let applied = match name {
            "BIND_ADDRESS" => set(&mut config.listener.bind_address, value),
            "REQUEST_TIMEOUT_SECS" => set(&mut config.timeouts.request_secs, value),
            "FAULTS_ENABLED" => set(&mut config.faults.enabled, value),
            "MIN_LATENCY_MS" => set(&mut config.faults.min_latency_ms, value),
            "MAX_LATENCY_MS" => set(&mut config.faults.max_latency_ms, value),
            "FAILURE_PROBABILITY" => set(&mut config.faults.failure_probability, value),
            "FAULT_SEED" => parse(value).map(|seed| config.faults.seed = Some(seed)),
            "METRICS_ENABLED" => set(&mut config.metrics.enabled, value),
            "METRICS_PREFIX" => set(&mut config.metrics.prefix, value),
            "SERVICE_NAME" => set(&mut config.tracing.service_name, value),
            "LOG_LEVEL" => set(&mut config.observability.log_level, value),
            "LOG_FORMAT" => match value.to_ascii_lowercase().as_str() {
                "pretty" => {
                    config.observability.log_format = LogFormat::Pretty;
                    Ok(())
                }
                "json" => {
                    config.observability.log_format = LogFormat::Json;
                    Ok(())
                }
                _ => Err("expected `pretty` or `json`".to_string()),
            },
            "VERSION" => set(&mut config.service.version, value),
            "ENVIRONMENT" => set(&mut config.service.environment, value),
            _ => {
                tracing::debug!(key = key.as_ref(), "Ignoring unknown environment override");
                Ok(())
            }
        };

        if let Err(message) = applied {
            errors.push(ValidationError::new(key.as_ref(), format!("{message} (got `{value}`)")));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors))
    }
}

fn set<T>(slot: &mut T, value: &str) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    *slot = parse(value)?;
    Ok(())
}

fn parse<T>(value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| e.to_string())
}
