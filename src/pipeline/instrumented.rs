//! Instrumented request pipeline.
//!
//! # Responsibilities
//! - Wrap a unit of work with a span, a timer and the active-requests gauge
//! - Count the request in both metric backends with the same labels
//! - Apply injected latency/failure before the work runs
//! - Record the outcome on the span and in the metrics, then hand the
//!   result back unchanged
//!
//! # Step Order
//! ```text
//! start span → start timer → gauge +1 → request counters +1
//!     → fault decision (sleep, maybe InjectedFault)
//!     → work
//!     → Ok: annotate span, status Ok
//!       Err: status Error(message), error counter +1, log
//!     → [always] gauge -1, durations recorded, span closed
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::observability::metrics::names;
use crate::observability::{LabelSet, MetricRegistry, Span, SpanTracker};
use crate::pipeline::guard::InvocationGuard;
use crate::pipeline::outcome::Annotate;
use crate::resilience::{FaultInjector, InjectedFault};

/// Runs units of work with correlated metrics and spans.
#[derive(Debug, Clone)]
pub struct InstrumentedPipeline {
    metrics: Arc<MetricRegistry>,
    spans: SpanTracker,
    faults: Option<Arc<FaultInjector>>,
}

impl InstrumentedPipeline {
    /// A pipeline without fault injection.
    ///
    /// `metrics` must declare the standard request metrics
    /// ([`MetricRegistry::standard`]).
    pub fn new(metrics: Arc<MetricRegistry>, spans: SpanTracker) -> Self {
        Self {
            metrics,
            spans,
            faults: None,
        }
    }

    /// Consult `faults` before every invocation.
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn metrics(&self) -> &Arc<MetricRegistry> {
        &self.metrics
    }

    pub fn spans(&self) -> &SpanTracker {
        &self.spans
    }

    pub fn faults(&self) -> Option<&Arc<FaultInjector>> {
        self.faults.as_ref()
    }

    /// Count `n` requests in both metric backends.
    pub fn count_request(&self, labels: &LabelSet, n: u64) {
        self.metrics.counter(names::REQUESTS_TOTAL, labels).increment(n);
        self.metrics.counter(names::SECONDARY_REQUESTS_TOTAL, labels).increment(n);
    }

    /// Run `work` as `operation`, annotating the span through [`Annotate`].
    pub async fn run<T, E, F, Fut>(&self, operation: &str, labels: &LabelSet, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Annotate,
        E: From<InjectedFault> + fmt::Display,
    {
        self.run_with(operation, labels, work, |value: &T, span: &mut Span| value.annotate(span))
            .await
    }

    /// Run `work` as `operation`, annotating the span with `annotate` on success.
    pub async fn run_with<T, E, F, Fut, A>(
        &self,
        operation: &str,
        labels: &LabelSet,
        work: F,
        annotate: A,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<InjectedFault> + fmt::Display,
        A: FnOnce(&T, &mut Span),
    {
        let span = self.spans.start_span(operation);
        let started = Instant::now();

        let active = self.metrics.gauge(names::ACTIVE_REQUESTS, &LabelSet::new());
        let duration_seconds = self
            .metrics
            .histogram(names::REQUEST_DURATION_SECONDS, &LabelSet::new());
        let duration_ms = self
            .metrics
            .histogram(names::SECONDARY_REQUEST_DURATION_MS, labels);
        let mut guard = InvocationGuard::enter(span, started, active, duration_seconds, duration_ms);

        self.count_request(labels, 1);

        let tracing_span = guard.span().tracing_span().clone();
        let context = guard.span().context();

        tracing_span.in_scope(|| {
            tracing::debug!(operation, labels = %labels, "Invocation started");
        });

        let result = match self.inject(operation).instrument(tracing_span.clone()).await {
            Err(fault) => Err(E::from(fault)),
            Ok(()) => {
                // Calling `work` inside the scope parents spans it opens before its first await.
                let work = async move { work().await };
                SpanTracker::scope(context, work.instrument(tracing_span.clone())).await
            }
        };

        match &result {
            Ok(value) => {
                annotate(value, guard.span_mut());
                guard.span_mut().set_ok();
                tracing_span.in_scope(|| {
                    tracing::debug!(operation, labels = %labels, "Invocation succeeded");
                });
            }
            Err(err) => {
                let message = err.to_string();
                guard.span_mut().set_error(message.as_str());
                self.metrics.counter(names::REQUEST_ERRORS_TOTAL, labels).inc();
                tracing_span.in_scope(|| {
                    tracing::error!(operation, labels = %labels, error = %message, "Invocation failed");
                });
            }
        }

        guard.settle();
        drop(guard);
        result
    }

    async fn inject(&self, operation: &str) -> Result<(), InjectedFault> {
        let Some(faults) = &self.faults else {
            return Ok(());
        };

        let decision = faults.decide();
        if !decision.delay.is_zero() {
            tracing::trace!(delay_ms = decision.delay.as_millis() as u64, "Injecting latency");
            tokio::time::sleep(decision.delay).await;
        }

        if decision.should_fail {
            tracing::warn!(operation, "Injecting failure");
            return Err(faults.fault(operation));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{InMemoryExporter, SpanStatus, TagValue};
    use crate::resilience::FaultProfile;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Fault(#[from] InjectedFault),
        #[error("work failed: {0}")]
        Work(&'static str),
    }

    fn pipeline() -> (InstrumentedPipeline, Arc<InMemoryExporter>) {
        let buffer = Arc::new(InMemoryExporter::new(64));
        let spans = SpanTracker::builder("test").exporter(buffer.clone()).build();
        let metrics = Arc::new(MetricRegistry::standard("test"));
        (InstrumentedPipeline::new(metrics, spans), buffer)
    }

    #[tokio::test]
    async fn test_work_error_is_returned_unchanged() {
        let (pipeline, buffer) = pipeline();
        let labels = LabelSet::request("GET", "/x");

        let result: Result<usize, TestError> = pipeline
            .run("op", &labels, || async { Err(TestError::Work("disk on fire")) })
            .await;

        assert!(matches!(result, Err(TestError::Work("disk on fire"))));
        let finished = buffer.finished();
        assert_eq!(finished[0].status, SpanStatus::Error("work failed: disk on fire".into()));
        assert_eq!(pipeline.metrics().counter(names::REQUEST_ERRORS_TOTAL, &labels).get(), 1);
        assert_eq!(pipeline.metrics().gauge(names::ACTIVE_REQUESTS, &LabelSet::new()).get(), 0);
    }

    #[tokio::test]
    async fn test_custom_annotation() {
        let (pipeline, buffer) = pipeline();
        let labels = LabelSet::request("GET", "/x");

        let value: Result<&str, TestError> = pipeline
            .run_with("op", &labels, || async { Ok("sunny") }, |v, span| span.set_tag("summary", *v))
            .await;

        assert_eq!(value.unwrap(), "sunny");
        assert_eq!(buffer.finished()[0].tag("summary"), Some(&TagValue::Str("sunny".into())));
    }

    #[tokio::test]
    async fn test_work_runs_inside_invocation_span() {
        let (pipeline, buffer) = pipeline();
        let spans = pipeline.spans().clone();

        let result: Result<(), TestError> = pipeline
            .run("outer", &LabelSet::request("GET", "/x"), || async move {
                let _inner = spans.start_span("inner");
                Ok(())
            })
            .await;
        assert!(result.is_ok());

        let outer = &buffer.named("outer")[0];
        let inner = &buffer.named("inner")[0];
        assert_eq!(inner.parent_id, Some(outer.context.span_id));
        assert_eq!(inner.context.trace_id, outer.context.trace_id);
    }

    #[tokio::test]
    async fn test_span_opened_by_closure_body_is_a_child() {
        let (pipeline, buffer) = pipeline();
        let spans = pipeline.spans().clone();

        let result: Result<(), TestError> = pipeline
            .run("outer", &LabelSet::request("GET", "/x"), || {
                let inner = spans.start_span("inner_sync");
                async move {
                    drop(inner);
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());

        let outer = &buffer.named("outer")[0];
        let inner = &buffer.named("inner_sync")[0];
        assert_eq!(inner.parent_id, Some(outer.context.span_id));
        assert_eq!(inner.context.trace_id, outer.context.trace_id);
    }

    #[tokio::test]
    async fn test_signed_literal_is_annotated() {
        let (pipeline, buffer) = pipeline();

        let result: Result<_, TestError> = pipeline
            .run("op", &LabelSet::request("GET", "/x"), || async { Ok(5) })
            .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(buffer.finished()[0].tag("count"), Some(&TagValue::Int(5)));
    }

    #[tokio::test]
    async fn test_secondary_backend_sees_same_counts() {
        let (pipeline, _buffer) = pipeline();
        let pipeline = pipeline.with_faults(Arc::new(
            FaultInjector::seeded(FaultProfile::disabled(), 1).unwrap(),
        ));
        let labels = LabelSet::request("GET", "/x");

        for _ in 0..3 {
            let _: Result<(), TestError> = pipeline.run("op", &labels, || async { Ok(()) }).await;
        }

        let metrics = pipeline.metrics();
        assert_eq!(metrics.counter(names::REQUESTS_TOTAL, &labels).get(), 3);
        assert_eq!(metrics.counter(names::SECONDARY_REQUESTS_TOTAL, &labels).get(), 3);
        assert_eq!(
            metrics.histogram(names::REQUEST_DURATION_SECONDS, &LabelSet::new()).count(),
            3
        );
        assert_eq!(
            metrics.histogram(names::SECONDARY_REQUEST_DURATION_MS, &labels).count(),
            3
        );
    }
}
