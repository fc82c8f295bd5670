//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → WEATHER_* environment overrides
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → sent to the server, which swaps the fault profile
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the fault profile is hot-swapped; everything else needs a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{apply_env_overrides, load_config, load_with_env, ConfigError};
pub use schema::{
    FaultConfig, HealthConfig, ListenerConfig, LogFormat, MetricsConfig, ObservabilityConfig,
    ServiceConfig, ServiceInfoConfig, TimeoutConfig, TracingConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
