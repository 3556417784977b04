//! Error types for CLI operations.

use contracts::ContractError;
use fleet::FleetError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ContractError),

    /// Session aborted on a fleet-level failure
    #[error("Session failed: {0}")]
    Session(FleetError),

    /// Operator interrupted the session
    #[error("Interrupted by signal")]
    Interrupted,
}

impl From<FleetError> for CliError {
    fn from(e: FleetError) -> Self {
        match e {
            FleetError::Interrupted => Self::Interrupted,
            e => Self::Session(e),
        }
    }
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
