//! Resilience exercising.
//!
//! # Data Flow
//! ```text
//! Pipeline invocation:
//!     → fault.rs (draw delay + failure flag from the active profile)
//!     → sleep(delay) (yields to other invocations)
//!     → should_fail ? InjectedFault : run work
//! ```
//!
//! # Design Decisions
//! - Injected faults are ordinary errors; callers recover from them
//! - Profiles are per injector, so different operations can carry
//!   different fault profiles

pub mod fault;

pub use fault::{FaultDecision, FaultInjector, FaultProfile, InjectedFault, InvalidFaultProfile};
