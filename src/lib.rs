//! Instrumented synthetic-weather service library.

pub mod config;
pub mod error;
pub mod forecast;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::InstrumentedPipeline;
