//! Layered error definitions
//!
//! Categorized by source: config / sdk

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== SDK Errors =====
    /// Error raised by the camera SDK
    #[error(transparent)]
    Sdk(#[from] SdkError),

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the camera SDK
///
/// Mirrors the error families of the vendor library that the coordinators
/// need to tell apart. Everything else is carried as `Backend`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    /// Lifecycle call issued in a state that does not allow it
    /// (e.g. `close` while streaming, `stop` on a closed sensor)
    #[error("wrong api call sequence: cannot {operation} sensor '{sensor}' while {state}")]
    WrongCallSequence {
        sensor: String,
        operation: String,
        state: String,
    },

    /// Bounded wait expired
    #[error("frame didn't arrive within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// Argument rejected by the SDK
    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    /// Device went away underneath us
    #[error("device '{device}' disconnected")]
    Disconnected { device: String },

    /// Any other backend failure
    #[error("sdk error: {message}")]
    Backend { message: String },
}

impl SdkError {
    /// Create a wrong-call-sequence error
    pub fn wrong_call_sequence(
        sensor: impl Into<String>,
        operation: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::WrongCallSequence {
            sensor: sensor.into(),
            operation: operation.into(),
            state: state.into(),
        }
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Whether this is the out-of-sequence condition tolerated on stop/close
    pub fn is_wrong_call_sequence(&self) -> bool {
        matches!(self, Self::WrongCallSequence { .. })
    }
}

/// SDK result alias
pub type SdkResult<T> = std::result::Result<T, SdkError>;
