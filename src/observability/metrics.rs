//! Metrics registry.
//!
//! # Responsibilities
//! - Declare request metrics (counters, histograms, gauges) with fixed label keys
//! - Hand out one shared instance per (metric name, label set)
//! - Mirror every update to the `metrics` facade for Prometheus exposition
//!
//! # Metrics
//! - `{prefix}_requests_total` (counter): requests by method, endpoint
//! - `{prefix}_request_duration_seconds` (histogram): latency distribution
//! - `{prefix}_active_requests` (gauge): in-flight pipeline invocations
//! - `{prefix}_request_errors_total` (counter): failed requests by method, endpoint
//! - `{prefix}_requests_otel_total` (counter): secondary backend request count
//! - `{prefix}_request_otel_duration_ms` (histogram): secondary backend latency
//!
//! The HTTP registry ([`MetricRegistry::http`]) is unprefixed and covers every
//! route, including `/health` and `/metrics`:
//! - `http_requests_received_total` (counter): responses by code, method, route
//! - `http_requests_in_progress` (gauge): in-flight requests by method, route
//! - `http_request_duration_seconds` (histogram): latency by code, method, route
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations per instance)
//! - Instance maps are sharded (`DashMap`), no lock spans all metrics
//! - Unknown names and undeclared label keys panic; silent metric loss is worse
//! - Install the global recorder before building a registry, handles are
//!   resolved once per instance

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::observability::labels::{LabelSet, CODE, ENDPOINT, METHOD, ROUTE};

/// Base metric names, before the registry prefix is applied.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
    pub const ACTIVE_REQUESTS: &str = "active_requests";
    pub const REQUEST_ERRORS_TOTAL: &str = "request_errors_total";
    pub const SECONDARY_REQUESTS_TOTAL: &str = "requests_otel_total";
    pub const SECONDARY_REQUEST_DURATION_MS: &str = "request_otel_duration_ms";

    pub const HTTP_REQUESTS_RECEIVED_TOTAL: &str = "http_requests_received_total";
    pub const HTTP_REQUESTS_IN_PROGRESS: &str = "http_requests_in_progress";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
}

/// Histogram buckets tuned for typical web latencies, in seconds.
pub const SECONDS_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// The same buckets expressed in milliseconds.
pub const MILLIS_BUCKETS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Kind of a declared metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

/// A lookup outside the declared metric schema.
///
/// These indicate a coding defect, so the infallible accessors on
/// [`MetricRegistry`] panic with this error instead of returning it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricLookupError {
    #[error("unknown metric `{name}`")]
    Unknown { name: String },

    #[error("metric `{name}` is a {actual}, not a {expected}")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    #[error("metric `{name}` expects label keys [{expected}], got [{actual}]")]
    LabelMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone)]
struct MetricSchema {
    exported_name: String,
    kind: MetricKind,
    help: String,
    /// Sorted, to compare against `LabelSet::keys`.
    label_keys: Vec<String>,
    buckets: Arc<[f64]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetricKey {
    name: String,
    labels: LabelSet,
}

/// Monotonically increasing counter.
pub struct Counter {
    labels: LabelSet,
    value: AtomicU64,
    exported: metrics::Counter,
}

impl Counter {
    pub fn increment(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
        self.exported.increment(n);
    }

    pub fn inc(&self) {
        self.increment(1);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("labels", &self.labels)
            .field("value", &self.get())
            .finish()
    }
}

/// Signed value that can go up and down.
pub struct Gauge {
    labels: LabelSet,
    value: AtomicI64,
    exported: metrics::Gauge,
}

impl Gauge {
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
        self.exported.increment(1.0);
    }

    pub fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
        self.exported.decrement(1.0);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge")
            .field("labels", &self.labels)
            .field("value", &self.get())
            .finish()
    }
}

/// Point-in-time view of a histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    /// Cumulative `(upper bound, count)` pairs, ending with `+Inf`.
    pub buckets: Vec<(f64, u64)>,
}

/// Fixed-bucket histogram of observed samples.
pub struct Histogram {
    labels: LabelSet,
    bounds: Arc<[f64]>,
    /// One slot per bound plus the `+Inf` overflow slot, non-cumulative.
    counts: Box<[AtomicU64]>,
    count: AtomicU64,
    sum_bits: AtomicU64,
    exported: metrics::Histogram,
}

impl Histogram {
    fn new(labels: LabelSet, bounds: Arc<[f64]>, exported: metrics::Histogram) -> Self {
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            labels,
            bounds,
            counts,
            count: AtomicU64::new(0),
            sum_bits: AtomicU64::new(0f64.to_bits()),
            exported,
        }
    }

    /// Record one sample. NaN samples are dropped.
    pub fn observe(&self, value: f64) {
        if value.is_nan() {
            tracing::debug!(labels = %self.labels, "Dropping NaN histogram sample");
            return;
        }

        let slot = self.bounds.partition_point(|bound| *bound < value);
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current, next, Ordering::Relaxed, Ordering::Relaxed
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.exported.record(value);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = 0;
        let buckets = self
            .bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(self.counts.iter())
            .map(|(bound, slot)| {
                cumulative += slot.load(Ordering::Relaxed);
                (bound, cumulative)
            })
            .collect();

        HistogramSnapshot {
            count: self.count(),
            sum: self.sum(),
            buckets,
        }
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("labels", &self.labels)
            .field("count", &self.count())
            .field("sum", &self.sum())
            .finish()
    }
}

/// Value of one metric instance in a registry snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Histogram(HistogramSnapshot),
}

/// One metric instance in a registry snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Exported (prefixed) name.
    pub name: String,
    pub labels: LabelSet,
    pub value: MetricValue,
}

/// Declares the metrics a [`MetricRegistry`] will accept.
#[derive(Debug)]
pub struct MetricRegistryBuilder {
    prefix: String,
    schemas: HashMap<String, MetricSchema>,
}

impl MetricRegistryBuilder {
    pub fn counter(self, name: &str, help: &str, label_keys: &[&str]) -> Self {
        self.declare(name, MetricKind::Counter, help, label_keys, &[])
    }

    pub fn gauge(self, name: &str, help: &str, label_keys: &[&str]) -> Self {
        self.declare(name, MetricKind::Gauge, help, label_keys, &[])
    }

    pub fn histogram(self, name: &str, help: &str, label_keys: &[&str], buckets: &[f64]) -> Self {
        self.declare(name, MetricKind::Histogram, help, label_keys, buckets)
    }

    fn declare(
        mut self,
        name: &str,
        kind: MetricKind,
        help: &str,
        label_keys: &[&str],
        buckets: &[f64],
    ) -> Self {
        let mut label_keys: Vec<String> = label_keys.iter().map(|k| k.to_string()).collect();
        label_keys.sort();
        label_keys.dedup();

        let mut buckets = buckets.to_vec();
        buckets.retain(|b| b.is_finite());
        buckets.sort_by(|a, b| a.total_cmp(b));
        buckets.dedup();

        let exported_name = if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.prefix, name)
        };

        self.schemas.insert(
            name.to_string(),
            MetricSchema {
                exported_name,
                kind,
                help: help.to_string(),
                label_keys,
                buckets: buckets.into(),
            },
        );
        self
    }

    pub fn build(self) -> MetricRegistry {
        for schema in self.schemas.values() {
            let name = schema.exported_name.clone();
            let help = schema.help.clone();
            match schema.kind {
                MetricKind::Counter => metrics::describe_counter!(name, help),
                MetricKind::Gauge => metrics::describe_gauge!(name, help),
                MetricKind::Histogram => metrics::describe_histogram!(name, help),
            }
        }

        tracing::debug!(
            prefix = %self.prefix,
            metrics = self.schemas.len(),
            "Metric registry built"
        );

        MetricRegistry {
            prefix: self.prefix,
            schemas: self.schemas,
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
        }
    }
}

/// Owns every metric instance for its lifetime.
///
/// Instances are created on first lookup and never removed. Repeated lookups
/// with equal label sets return the same `Arc`.
#[derive(Debug)]
pub struct MetricRegistry {
    prefix: String,
    schemas: HashMap<String, MetricSchema>,
    counters: DashMap<MetricKey, Arc<Counter>>,
    gauges: DashMap<MetricKey, Arc<Gauge>>,
    histograms: DashMap<MetricKey, Arc<Histogram>>,
}

impl MetricRegistry {
    pub fn builder(prefix: impl Into<String>) -> MetricRegistryBuilder {
        MetricRegistryBuilder {
            prefix: prefix.into(),
            schemas: HashMap::new(),
        }
    }

    /// Registry declaring the request metrics used by the instrumented pipeline.
    pub fn standard(prefix: impl Into<String>) -> Self {
        Self::builder(prefix)
            .counter(names::REQUESTS_TOTAL, "Total requests", &[METHOD, ENDPOINT])
            .histogram(
                names::REQUEST_DURATION_SECONDS,
                "Request duration in seconds",
                &[],
                SECONDS_BUCKETS,
            )
            .gauge(names::ACTIVE_REQUESTS, "Currently active requests", &[])
            .counter(
                names::REQUEST_ERRORS_TOTAL,
                "Total failed requests",
                &[METHOD, ENDPOINT],
            )
            .counter(
                names::SECONDARY_REQUESTS_TOTAL,
                "Total requests (tracing backend)",
                &[METHOD, ENDPOINT],
            )
            .histogram(
                names::SECONDARY_REQUEST_DURATION_MS,
                "Request duration in milliseconds (tracing backend)",
                &[METHOD, ENDPOINT],
                MILLIS_BUCKETS,
            )
            .build()
    }

    /// Unprefixed registry for the HTTP middleware.
    pub fn http() -> Self {
        Self::builder("")
            .counter(
                names::HTTP_REQUESTS_RECEIVED_TOTAL,
                "Requests received, by status code, method and route",
                &[CODE, METHOD, ROUTE],
            )
            .gauge(
                names::HTTP_REQUESTS_IN_PROGRESS,
                "Requests currently being handled",
                &[METHOD, ROUTE],
            )
            .histogram(
                names::HTTP_REQUEST_DURATION_SECONDS,
                "Time to produce a response, in seconds",
                &[CODE, METHOD, ROUTE],
                SECONDS_BUCKETS,
            )
            .build()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Look up a counter, panicking on a schema violation.
    pub fn counter(&self, name: &str, labels: &LabelSet) -> Arc<Counter> {
        self.try_counter(name, labels)
            .unwrap_or_else(|err| panic!("metric lookup failed: {}", err))
    }

    /// Look up a gauge, panicking on a schema violation.
    pub fn gauge(&self, name: &str, labels: &LabelSet) -> Arc<Gauge> {
        self.try_gauge(name, labels)
            .unwrap_or_else(|err| panic!("metric lookup failed: {}", err))
    }

    /// Look up a histogram, panicking on a schema violation.
    pub fn histogram(&self, name: &str, labels: &LabelSet) -> Arc<Histogram> {
        self.try_histogram(name, labels)
            .unwrap_or_else(|err| panic!("metric lookup failed: {}", err))
    }

    pub fn try_counter(&self, name: &str, labels: &LabelSet) -> Result<Arc<Counter>, MetricLookupError> {
        let schema = self.schema(name, MetricKind::Counter, labels)?;
        let key = MetricKey { name: name.to_string(), labels: labels.clone() };
        if let Some(existing) = self.counters.get(&key) {
            return Ok(existing.value().clone());
        }

        let entry = self.counters.entry(key).or_insert_with(|| {
            let exported =
                metrics::counter!(schema.exported_name.clone(), labels.to_metrics_labels());
            Arc::new(Counter {
                labels: labels.clone(),
                value: AtomicU64::new(0),
                exported,
            })
        });
        Ok(entry.value().clone())
    }

    pub fn try_gauge(&self, name: &str, labels: &LabelSet) -> Result<Arc<Gauge>, MetricLookupError> {
        let schema = self.schema(name, MetricKind::Gauge, labels)?;
        let key = MetricKey { name: name.to_string(), labels: labels.clone() };
        if let Some(existing) = self.gauges.get(&key) {
            return Ok(existing.value().clone());
        }

        let entry = self.gauges.entry(key).or_insert_with(|| {
            let exported =
                metrics::gauge!(schema.exported_name.clone(), labels.to_metrics_labels());
            Arc::new(Gauge {
                labels: labels.clone(),
                value: AtomicI64::new(0),
                exported,
            })
        });
        Ok(entry.value().clone())
    }

    pub fn try_histogram(&self, name: &str, labels: &LabelSet) -> Result<Arc<Histogram>, MetricLookupError> {
        let schema = self.schema(name, MetricKind::Histogram, labels)?;
        let key = MetricKey { name: name.to_string(), labels: labels.clone() };
        if let Some(existing) = self.histograms.get(&key) {
            return Ok(existing.value().clone());
        }

        let entry = self.histograms.entry(key).or_insert_with(|| {
            let exported =
                metrics::histogram!(schema.exported_name.clone(), labels.to_metrics_labels());
            Arc::new(Histogram::new(labels.clone(), schema.buckets.clone(), exported))
        });
        Ok(entry.value().clone())
    }

    fn schema(
        &self,
        name: &str,
        expected: MetricKind,
        labels: &LabelSet,
    ) -> Result<&MetricSchema, MetricLookupError> {
        let schema = self.schemas.get(name).ok_or_else(|| MetricLookupError::Unknown {
            name: name.to_string(),
        })?;

        if schema.kind != expected {
            return Err(MetricLookupError::KindMismatch {
                name: name.to_string(),
                expected,
                actual: schema.kind,
            });
        }

        if !labels.keys().eq(schema.label_keys.iter().map(String::as_str)) {
            return Err(MetricLookupError::LabelMismatch {
                name: name.to_string(),
                expected: schema.label_keys.join(", "),
                actual: labels.keys().collect::<Vec<_>>().join(", "),
            });
        }

        Ok(schema)
    }

    /// Current value of every instance created so far, sorted by name then labels.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let exported = |name: &str| {
            self.schemas
                .get(name)
                .map(|s| s.exported_name.clone())
                .unwrap_or_else(|| name.to_string())
        };

        let mut samples: Vec<MetricSample> = Vec::new();
        samples.extend(self.counters.iter().map(|r| MetricSample {
            name: exported(&r.key().name),
            labels: r.key().labels.clone(),
            value: MetricValue::Counter(r.value().get()),
        }));
        samples.extend(self.gauges.iter().map(|r| MetricSample {
            name: exported(&r.key().name),
            labels: r.key().labels.clone(),
            value: MetricValue::Gauge(r.value().get()),
        }));
        samples.extend(self.histograms.iter().map(|r| MetricSample {
            name: exported(&r.key().name),
            labels: r.key().labels.clone(),
            value: MetricValue::Histogram(r.value().snapshot()),
        }));

        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        samples
    }
}
