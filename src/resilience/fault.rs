//! Latency and failure injection.
//!
//! # Responsibilities
//! - Decide per invocation how long to delay and whether to fail
//! - Keep decisions reproducible under a seeded random source
//! - Allow the fault profile to be swapped at runtime (config reload)
//!
//! # Design Decisions
//! - Random source is passed in; no thread-local or global generator
//! - The RNG lock is held only for the draw, never across an `.await`
//! - Profiles are validated up front: `gen_bool` panics outside `[0, 1]`

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;

/// Latency range and failure rate applied to one kind of operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultProfile {
    /// Lower bound of the injected delay, inclusive.
    pub min_latency_ms: u64,
    /// Upper bound of the injected delay, inclusive.
    pub max_latency_ms: u64,
    /// Probability in `[0, 1]` that an invocation fails.
    pub failure_probability: f64,
    /// Message carried by [`InjectedFault`].
    pub failure_message: String,
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            min_latency_ms: 50,
            max_latency_ms: 300,
            failure_probability: 0.05,
            failure_message: "Service temporarily unavailable".to_string(),
        }
    }
}

impl FaultProfile {
    /// No delay, never fails.
    pub fn disabled() -> Self {
        Self {
            min_latency_ms: 0,
            max_latency_ms: 0,
            failure_probability: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), InvalidFaultProfile> {
        if self.min_latency_ms > self.max_latency_ms {
            return Err(InvalidFaultProfile::LatencyRange {
                min_ms: self.min_latency_ms,
                max_ms: self.max_latency_ms,
            });
        }
        if !(0.0..=1.0).contains(&self.failure_probability) {
            return Err(InvalidFaultProfile::Probability(self.failure_probability));
        }
        Ok(())
    }
}

/// A fault profile that cannot be sampled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidFaultProfile {
    #[error("latency range is empty: min {min_ms}ms > max {max_ms}ms")]
    LatencyRange { min_ms: u64, max_ms: u64 },

    #[error("failure probability {0} is outside [0, 1]")]
    Probability(f64),
}

/// What to do to one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultDecision {
    pub delay: Duration,
    pub should_fail: bool,
}

/// Deliberate failure raised in place of running the wrapped work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InjectedFault {
    pub operation: String,
    pub message: String,
}

/// Draws [`FaultDecision`]s from a profile and an injected random source.
pub struct FaultInjector {
    profile: ArcSwap<FaultProfile>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl fmt::Debug for FaultInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultInjector")
            .field("profile", &*self.profile.load())
            .finish_non_exhaustive()
    }
}

impl FaultInjector {
    pub fn new<R>(profile: FaultProfile, rng: R) -> Result<Self, InvalidFaultProfile>
    where
        R: RngCore + Send + 'static,
    {
        profile.validate()?;
        Ok(Self {
            profile: ArcSwap::from_pointee(profile),
            rng: Mutex::new(Box::new(rng)),
        })
    }

    /// Deterministic injector for a fixed seed.
    pub fn seeded(profile: FaultProfile, seed: u64) -> Result<Self, InvalidFaultProfile> {
        Self::new(profile, StdRng::seed_from_u64(seed))
    }

    /// Injector seeded from OS entropy.
    pub fn from_entropy(profile: FaultProfile) -> Result<Self, InvalidFaultProfile> {
        Self::new(profile, StdRng::from_entropy())
    }

    pub fn profile(&self) -> Arc<FaultProfile> {
        self.profile.load_full()
    }

    /// Replace the active profile. Invocations already past `decide` are unaffected.
    pub fn update_profile(&self, profile: FaultProfile) -> Result<(), InvalidFaultProfile> {
        profile.validate()?;
        tracing::info!(
            min_latency_ms = profile.min_latency_ms,
            max_latency_ms = profile.max_latency_ms,
            failure_probability = profile.failure_probability,
            "Fault profile updated"
        );
        self.profile.store(Arc::new(profile));
        Ok(())
    }

    /// Draw the delay, then the failure flag.
    pub fn decide(&self) -> FaultDecision {
        let profile = self.profile.load();
        let mut rng = self.rng.lock().expect("fault injector rng mutex poisoned");

        let delay_ms = rng.gen_range(profile.min_latency_ms..=profile.max_latency_ms);
        let should_fail = rng.gen_bool(profile.failure_probability);

        FaultDecision {
            delay: Duration::from_millis(delay_ms),
            should_fail,
        }
    }

    /// The error to raise for `operation` under the current profile.
    pub fn fault(&self, operation: &str) -> InjectedFault {
        InjectedFault {
            operation: operation.to_string(),
            message: self.profile.load().failure_message.clone(),
        }
    }
}
