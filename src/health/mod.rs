//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health, /health/ready (or any caller)
//!     → aggregator.rs evaluates every registered probe concurrently
//!     → each probe bounded by the probe timeout, panics caught
//!     → status.rs reduces outcomes to the worst status
//!     → HealthReport (overall status + per-probe breakdown)
//! ```
//!
//! # Design Decisions
//! - Evaluated on demand, never cached
//! - Independent of the request pipeline; shares no locks with it
//! - A failing probe degrades the report, never the aggregator

pub mod aggregator;
pub mod probes;
pub mod status;

pub use aggregator::{HealthAggregator, HealthReport, ProbeFailure, ProbeOutcome};
pub use status::{HealthStatus, ProbeResult};
