//! Per-request HTTP metrics.
//! Counts and times every response by status code, method and matched route.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::observability::labels::{CODE, METHOD, ROUTE};
use crate::observability::metrics::names;
use crate::observability::{Gauge, LabelSet, MetricRegistry};

/// Route label for requests no route matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Holds the in-progress gauge up until dropped, including on cancellation.
struct InProgress(Arc<Gauge>);

impl InProgress {
    fn enter(gauge: Arc<Gauge>) -> Self {
        gauge.increment();
        Self(gauge)
    }
}

impl Drop for InProgress {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

pub async fn track_http_metrics(
    State(metrics): State<Arc<MetricRegistry>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let in_progress_labels = LabelSet::new().with(METHOD, &method).with(ROUTE, &route);
    let in_progress =
        InProgress::enter(metrics.gauge(names::HTTP_REQUESTS_IN_PROGRESS, &in_progress_labels));
    let started = Instant::now();

    let response = next.run(req).await;

    let labels = in_progress_labels.with(CODE, response.status().as_str());
    metrics
        .counter(names::HTTP_REQUESTS_RECEIVED_TOTAL, &labels)
        .inc();
    metrics
        .histogram(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .observe(started.elapsed().as_secs_f64());
    drop(in_progress);

    response
}
