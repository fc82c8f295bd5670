//! Synthetic weather domain.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → service.rs (operation name + labels)
//!     → pipeline (spans, metrics, faults)
//!     → generator.rs (random forecasts)
//! ```

pub mod generator;
pub mod service;

pub use generator::WeatherForecast;
pub use service::{MetricsDemo, ServiceHealth, ServiceInfo, WeatherService};
