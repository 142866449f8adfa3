use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки инициализации логирования.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}'")]
    InvalidLevel { level: String },

    #[error("invalid log format '{format}' (expected pretty, compact or json)")]
    InvalidFormat { format: String },

    #[error("invalid log filter directive '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("global tracing subscriber already installed: {reason}")]
    AlreadyInitialized { reason: String },
}

impl ErrorExt for LoggingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidLevel { .. } | Self::InvalidFormat { .. } => StatusCode::InvalidConfig,
            Self::InvalidFilter { .. } => StatusCode::InvalidLogFilter,
            Self::AlreadyInitialized { .. } => StatusCode::LoggingInitFailed,
        }
    }
}
