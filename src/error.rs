//! Crate-level error type.
//!
//! Every operation is a deterministic computation over in-memory state, so
//! none of these errors is transient: retrying the same call yields the same
//! error. Callers should fix the input or check the experiment status.

use crate::experiment::model::ExperimentStatus;

/// Errors returned by the experiment engine and its configuration layer.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    /// The experiment definition (or a recorded value) is malformed.
    /// Nothing was stored.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No experiment with this id exists in the registry.
    #[error("experiment '{0}' not found")]
    NotFound(String),

    /// The operation is not legal for the experiment's current status.
    #[error("cannot {operation} experiment '{id}' while it is {status}")]
    InvalidState {
        id: String,
        status: ExperimentStatus,
        operation: &'static str,
    },

    /// An experiment definition file could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExperimentError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ExperimentError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExperimentError::NotFound(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, ExperimentError::InvalidState { .. })
    }
}

impl From<toml::de::Error> for ExperimentError {
    fn from(err: toml::de::Error) -> Self {
        ExperimentError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExperimentError>;
