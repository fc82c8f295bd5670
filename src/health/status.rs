//! Probe status values.
//!
//! # States
//! - Healthy: probe passed
//! - Degraded: service usable with reduced capability
//! - Unhealthy: probe failed, errored, panicked or timed out
//!
//! Ordered `Healthy < Degraded < Unhealthy`; the overall status is the worst.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// The worst of `statuses`; `Healthy` when there are none.
    pub fn worst<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
    }

    /// Whether traffic should still be routed here (Healthy or Degraded).
    pub fn is_available(&self) -> bool {
        *self != HealthStatus::Unhealthy
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// What a probe reports when it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub status: HealthStatus,
    pub description: Option<String>,
}

impl ProbeResult {
    pub fn healthy() -> Self {
        Self { status: HealthStatus::Healthy, description: None }
    }

    pub fn healthy_with(description: impl Into<String>) -> Self {
        Self { status: HealthStatus::Healthy, description: Some(description.into()) }
    }

    pub fn degraded(description: impl Into<String>) -> Self {
        Self { status: HealthStatus::Degraded, description: Some(description.into()) }
    }

    pub fn unhealthy(description: impl Into<String>) -> Self {
        Self { status: HealthStatus::Unhealthy, description: Some(description.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status() {
        use HealthStatus::*;
        assert_eq!(HealthStatus::worst([]), Healthy);
        assert_eq!(HealthStatus::worst([Healthy, Healthy]), Healthy);
        assert_eq!(HealthStatus::worst([Healthy, Degraded]), Degraded);
        assert_eq!(HealthStatus::worst([Unhealthy, Degraded, Healthy]), Unhealthy);
    }

    #[test]
    fn test_availability() {
        assert!(HealthStatus::Healthy.is_available());
        assert!(HealthStatus::Degraded.is_available());
        assert!(!HealthStatus::Unhealthy.is_available());
    }
}
