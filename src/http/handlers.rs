//! Route handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Error;
use crate::forecast::{MetricsDemo, ServiceHealth, WeatherForecast};
use crate::health::{HealthReport, HealthStatus};
use crate::http::server::AppState;
use crate::observability::FinishedSpan;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub async fn get_forecasts(
    State(state): State<AppState>,
) -> Result<Json<Vec<WeatherForecast>>, Error> {
    Ok(Json(state.service.forecasts().await?))
}

pub async fn get_service_health(State(state): State<AppState>) -> Json<ServiceHealth> {
    Json(state.service.health_check())
}

pub async fn get_metrics_demo(State(state): State<AppState>) -> Json<MetricsDemo> {
    Json(state.service.metrics_demo())
}

/// Aggregated probe report; 503 when Unhealthy.
pub async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health.evaluate().await;
    let status = if report.status.is_available() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

/// The process is up and serving; probes are not consulted.
pub async fn get_liveness() -> Json<Liveness> {
    Json(Liveness {
        status: HealthStatus::Healthy,
        timestamp: Utc::now(),
    })
}

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) if state.metrics_enabled => (
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            handle.render(),
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, "Metrics are disabled").into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct SpanView {
    pub name: String,
    pub service: String,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub trace_id: String,
    pub span_id: String,
    pub parent_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
    pub status: String,
    pub tags: BTreeMap<String, String>,
}

impl From<&FinishedSpan> for SpanView {
    fn from(span: &FinishedSpan) -> Self {
        Self {
            name: span.name.clone(),
            service: span.service.clone(),
            version: span.version.clone(),
            environment: span.environment.clone(),
            trace_id: format!("{:032x}", span.context.trace_id),
            span_id: format!("{:016x}", span.context.span_id),
            parent_id: span.parent_id.map(|id| format!("{:016x}", id)),
            started_at: span.started_at,
            duration_ms: span.duration.as_secs_f64() * 1000.0,
            status: span.status.to_string(),
            tags: span
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
        }
    }
}

/// Most recently closed spans, oldest first.
pub async fn get_recent_spans(State(state): State<AppState>) -> Json<Vec<SpanView>> {
    Json(state.spans.finished().iter().map(SpanView::from).collect())
}
