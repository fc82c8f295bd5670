//! Span tracking.
//!
//! # Responsibilities
//! - Create spans with trace/span IDs and parent linkage
//! - Attach tags and record `Ok`/`Error` status
//! - Close every span exactly once and hand it to the exporters
//!
//! # Design Decisions
//! - Spans close on drop, so early returns, panics and cancelled futures
//!   still produce a finished span
//! - Parent linkage comes from a task-local context (`SpanTracker::scope`);
//!   `start_span_with_parent` sets it explicitly
//! - Each span owns a `tracing` span so log events emitted inside it carry
//!   the same trace and span IDs

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::futures::TaskLocalFuture;
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_SPAN: SpanContext;
}

/// Identity of a span within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u128,
    pub span_id: u64,
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}-{:016x}", self.trace_id, self.span_id)
    }
}

/// Outcome recorded on a span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

impl SpanStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, SpanStatus::Error(_))
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanStatus::Unset => write!(f, "unset"),
            SpanStatus::Ok => write!(f, "ok"),
            SpanStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// A tag value attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => write!(f, "{}", s),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Float(x) => write!(f, "{}", x),
            TagValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Str(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Str(s)
    }
}

impl From<i64> for TagValue {
    fn from(i: i64) -> Self {
        TagValue::Int(i)
    }
}

impl From<u64> for TagValue {
    fn from(i: u64) -> Self {
        TagValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<usize> for TagValue {
    fn from(i: usize) -> Self {
        TagValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<i32> for TagValue {
    fn from(i: i32) -> Self {
        TagValue::Int(i64::from(i))
    }
}

impl From<f64> for TagValue {
    fn from(x: f64) -> Self {
        TagValue::Float(x)
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Bool(b)
    }
}

/// A closed span, as seen by exporters.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSpan {
    pub name: String,
    pub service: String,
    pub version: Option<String>,
    /// Deployment environment the service runs in.
    pub environment: Option<String>,
    pub context: SpanContext,
    pub parent_id: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub status: SpanStatus,
    pub tags: BTreeMap<String, TagValue>,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}

/// Receives spans as they close.
pub trait SpanExporter: Send + Sync {
    fn export(&self, span: &FinishedSpan);
}

/// Writes one structured log event per closed span.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    fn export(&self, span: &FinishedSpan) {
        let tags: Vec<String> = span.tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let trace_id = format!("{:032x}", span.context.trace_id);

        if span.status.is_error() {
            tracing::warn!(
                target: "weather_telemetry::spans",
                service = %span.service,
                version = span.version.as_deref().unwrap_or("unknown"),
                environment = span.environment.as_deref().unwrap_or("unknown"),
                span = %span.name,
                trace_id = %trace_id,
                span_id = span.context.span_id,
                parent_id = ?span.parent_id,
                duration_ms = span.duration.as_secs_f64() * 1000.0,
                status = %span.status,
                tags = ?tags,
                "Span closed"
            );
        } else {
            tracing::info!(
                target: "weather_telemetry::spans",
                service = %span.service,
                version = span.version.as_deref().unwrap_or("unknown"),
                environment = span.environment.as_deref().unwrap_or("unknown"),
                span = %span.name,
                trace_id = %trace_id,
                span_id = span.context.span_id,
                parent_id = ?span.parent_id,
                duration_ms = span.duration.as_secs_f64() * 1000.0,
                status = %span.status,
                tags = ?tags,
                "Span closed"
            );
        }
    }
}

/// Keeps the most recent closed spans in memory.
#[derive(Debug)]
pub struct InMemoryExporter {
    spans: Mutex<VecDeque<FinishedSpan>>,
    capacity: usize,
}

impl InMemoryExporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            spans: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Closed spans, oldest first.
    pub fn finished(&self) -> Vec<FinishedSpan> {
        let spans = self.spans.lock().expect("span buffer mutex poisoned");
        spans.iter().cloned().collect()
    }

    /// Closed spans with the given name, oldest first.
    pub fn named(&self, name: &str) -> Vec<FinishedSpan> {
        let spans = self.spans.lock().expect("span buffer mutex poisoned");
        spans.iter().filter(|s| s.name == name).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().expect("span buffer mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.spans.lock().expect("span buffer mutex poisoned").clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, span: &FinishedSpan) {
        let mut spans = self.spans.lock().expect("span buffer mutex poisoned");
        if spans.len() == self.capacity {
            spans.pop_front();
        }
        spans.push_back(span.clone());
    }
}

/// Opened/closed span counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpanStats {
    pub opened: u64,
    pub closed: u64,
}

struct TrackerShared {
    service: String,
    version: Option<String>,
    environment: Option<String>,
    exporters: Vec<Arc<dyn SpanExporter>>,
    next_span_id: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
}

/// Creates spans and routes closed ones to the exporters.
#[derive(Clone)]
pub struct SpanTracker {
    shared: Arc<TrackerShared>,
}

impl fmt::Debug for SpanTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanTracker")
            .field("service", &self.shared.service)
            .field("version", &self.shared.version)
            .field("environment", &self.shared.environment)
            .field("exporters", &self.shared.exporters.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Builder for [`SpanTracker`].
pub struct SpanTrackerBuilder {
    service: String,
    version: Option<String>,
    environment: Option<String>,
    exporters: Vec<Arc<dyn SpanExporter>>,
}

impl SpanTrackerBuilder {
    /// Service version stamped on every finished span.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn exporter(mut self, exporter: Arc<dyn SpanExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    pub fn build(self) -> SpanTracker {
        SpanTracker {
            shared: Arc::new(TrackerShared {
                service: self.service,
                version: self.version,
                environment: self.environment,
                exporters: self.exporters,
                next_span_id: AtomicU64::new(1),
                opened: AtomicU64::new(0),
                closed: AtomicU64::new(0),
            }),
        }
    }
}

impl SpanTracker {
    /// A tracker with no exporters.
    pub fn new(service: impl Into<String>) -> Self {
        Self::builder(service).build()
    }

    pub fn builder(service: impl Into<String>) -> SpanTrackerBuilder {
        SpanTrackerBuilder {
            service: service.into(),
            version: None,
            environment: None,
            exporters: Vec::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.shared.service
    }

    /// Start a span, parented to the current task-local span if there is one.
    pub fn start_span(&self, name: impl Into<String>) -> Span {
        self.start_span_with_parent(name, Self::current())
    }

    /// Start a span with an explicit parent (`None` starts a new trace).
    pub fn start_span_with_parent(&self, name: impl Into<String>, parent: Option<SpanContext>) -> Span {
        let name = name.into();
        let trace_id = parent
            .map(|p| p.trace_id)
            .unwrap_or_else(|| Uuid::new_v4().as_u128());
        let span_id = self.shared.next_span_id.fetch_add(1, Ordering::Relaxed);
        let context = SpanContext { trace_id, span_id };
        self.shared.opened.fetch_add(1, Ordering::Relaxed);

        let trace_hex = format!("{:032x}", trace_id);
        let inner = tracing::info_span!(
            "span",
            operation = %name,
            trace_id = %trace_hex,
            span_id,
            status = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        Span {
            shared: self.shared.clone(),
            name,
            context,
            parent_id: parent.map(|p| p.span_id),
            started: Instant::now(),
            started_at: Utc::now(),
            status: SpanStatus::Unset,
            tags: BTreeMap::new(),
            closed: false,
            inner,
        }
    }

    /// The span context installed by the enclosing [`SpanTracker::scope`], if any.
    pub fn current() -> Option<SpanContext> {
        CURRENT_SPAN.try_with(|ctx| *ctx).ok()
    }

    /// Run `fut` with `ctx` as the current span context.
    pub fn scope<F: Future>(ctx: SpanContext, fut: F) -> TaskLocalFuture<SpanContext, F> {
        CURRENT_SPAN.scope(ctx, fut)
    }

    pub fn stats(&self) -> SpanStats {
        SpanStats {
            opened: self.shared.opened.load(Ordering::Relaxed),
            closed: self.shared.closed.load(Ordering::Relaxed),
        }
    }
}

/// One traced operation. Closed on drop if not closed explicitly.
pub struct Span {
    shared: Arc<TrackerShared>,
    name: String,
    context: SpanContext,
    parent_id: Option<u64>,
    started: Instant,
    started_at: DateTime<Utc>,
    status: SpanStatus,
    tags: BTreeMap<String, TagValue>,
    closed: bool,
    inner: tracing::Span,
}

impl Span {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    pub fn status(&self) -> &SpanStatus {
        &self.status
    }

    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The `tracing` span mirroring this span, for `Instrument` and `in_scope`.
    pub fn tracing_span(&self) -> &tracing::Span {
        &self.inner
    }

    /// Attach a tag. Ignored once the span is closed.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        if self.closed {
            return;
        }
        self.tags.insert(key.into(), value.into());
    }

    pub fn set_ok(&mut self) {
        if self.closed {
            return;
        }
        self.status = SpanStatus::Ok;
        self.inner.record("status", "ok");
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        if self.closed {
            return;
        }
        let message = message.into();
        self.inner.record("status", "error");
        self.inner.record("error", message.as_str());
        self.status = SpanStatus::Error(message);
    }

    /// Close the span and export it. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let finished = FinishedSpan {
            name: self.name.clone(),
            service: self.shared.service.clone(),
            version: self.shared.version.clone(),
            environment: self.shared.environment.clone(),
            context: self.context,
            parent_id: self.parent_id,
            started_at: self.started_at,
            duration: self.started.elapsed(),
            status: self.status.clone(),
            tags: self.tags.clone(),
        };

        self.shared.closed.fetch_add(1, Ordering::Relaxed);
        for exporter in &self.shared.exporters {
            exporter.export(&finished);
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("parent_id", &self.parent_id)
            .field("status", &self.status)
            .field("tags", &self.tags)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.close();
    }
}
