//! Cleanup guard for one pipeline invocation.

use std::sync::Arc;
use std::time::Instant;

use crate::observability::{Gauge, Histogram, Span};

/// Holds the active-requests slot and the span of one invocation.
///
/// Dropping the guard decrements the gauge, records the elapsed time to both
/// duration histograms and closes the span. This runs on every exit path,
/// including a panic in the wrapped work and the invocation future being
/// dropped mid-flight.
#[derive(Debug)]
pub(crate) struct InvocationGuard {
    span: Span,
    started: Instant,
    active: Arc<Gauge>,
    duration_seconds: Arc<Histogram>,
    duration_ms: Arc<Histogram>,
    settled: bool,
}

impl InvocationGuard {
    /// Take an active-requests slot.
    pub(crate) fn enter(
        span: Span,
        started: Instant,
        active: Arc<Gauge>,
        duration_seconds: Arc<Histogram>,
        duration_ms: Arc<Histogram>,
    ) -> Self {
        active.increment();
        Self {
            span,
            started,
            active,
            duration_seconds,
            duration_ms,
            settled: false,
        }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn span_mut(&mut self) -> &mut Span {
        &mut self.span
    }

    /// Mark that an outcome (success or failure) was recorded on the span.
    pub(crate) fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        if !self.settled {
            let reason = if std::thread::panicking() { "panicked" } else { "cancelled" };
            self.span.set_error(reason);
            tracing::warn!(
                operation = %self.span.name(),
                reason,
                "Invocation ended without an outcome"
            );
        }

        self.active.decrement();

        let elapsed = self.started.elapsed().as_secs_f64();
        self.duration_seconds.observe(elapsed);
        self.duration_ms.observe(elapsed * 1000.0);

        self.span.close();
    }
}
