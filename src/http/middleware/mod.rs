//! Router-wide middleware.

pub mod http_metrics;

pub use http_metrics::track_http_metrics;
