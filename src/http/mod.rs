//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, timeout)
//!     → middleware/ (per-route HTTP metrics)
//!     → handlers.rs (forecast service, health aggregator, scrape)
//!     → response.rs (errors mapped to status codes)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;

pub use response::ErrorBody;
pub use server::{AppState, HttpServer, X_REQUEST_ID};
