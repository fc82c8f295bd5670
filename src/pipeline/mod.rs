//! Instrumented pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Caller (forecast service, tests)
//!     → instrumented.rs (span, timer, gauge, counters, fault injection)
//!     → work future (runs inside the invocation's span scope)
//!     → outcome.rs (span tags on success)
//!     → guard.rs (gauge/duration/span cleanup on every exit path)
//! ```
//!
//! # Design Decisions
//! - Cleanup is a drop guard, not a `match` arm, so cancellation and panics
//!   are covered
//! - Errors are observed and returned as-is, never swallowed or wrapped

mod guard;
pub mod instrumented;
pub mod outcome;

pub use instrumented::InstrumentedPipeline;
pub use outcome::{Annotate, COUNT_TAG};
