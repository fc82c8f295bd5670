//! Crate-level error type.

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::resilience::InjectedFault;

#[derive(Debug, Error)]
pub enum Error {
    /// Deliberate failure from the fault injector.
    #[error(transparent)]
    InjectedFault(#[from] InjectedFault),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_injected_fault(&self) -> bool {
        matches!(self, Error::InjectedFault(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
