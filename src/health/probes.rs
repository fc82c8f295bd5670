//! Built-in probes registered at startup.

use tower::BoxError;

use crate::health::aggregator::HealthAggregator;
use crate::health::status::ProbeResult;

pub const SELF_PROBE: &str = "self";
pub const DATABASE_PROBE: &str = "database";

/// Register the `self` and `database` probes.
pub fn register_builtin(health: &HealthAggregator) {
    health.register_fn(SELF_PROBE, || Ok::<_, BoxError>(ProbeResult::healthy()));
    // No real database behind the service; the probe stands in for one.
    health.register_fn(DATABASE_PROBE, || {
        Ok::<_, BoxError>(ProbeResult::healthy_with("Simulated DB connection"))
    });
}
