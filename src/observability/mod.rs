//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Instrumented pipeline produces:
//!     → metrics.rs (counters, gauges, histograms keyed by labels.rs)
//!         → mirrored to the `metrics` facade → export.rs (Prometheus scrape)
//!     → tracing.rs (spans with trace/span IDs, tags, status)
//!         → SpanExporter (log line per span, in-memory ring buffer)
//!     → logging.rs (structured log events, correlated via the active span)
//! ```
//!
//! # Design Decisions
//! - Registry and tracker are plain values passed by `Arc`, never statics
//! - Metric names and label keys are declared up front; lookups outside the
//!   declared schema are programmer errors
//! - In-process atomics are the source of truth; the `metrics` facade only
//!   mirrors updates to whatever recorder is installed

pub mod export;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod tracing;

pub use self::labels::LabelSet;
pub use self::metrics::{Counter, Gauge, Histogram, MetricLookupError, MetricRegistry};
pub use self::tracing::{
    FinishedSpan, InMemoryExporter, LogExporter, Span, SpanContext, SpanExporter, SpanStatus,
    SpanTracker, TagValue,
};
