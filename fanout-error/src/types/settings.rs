use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки загрузки и проверки настроек.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Не удалось собрать или десериализовать конфигурацию.
    #[error("failed to load settings: {reason}")]
    Load { reason: String },

    /// Значение поля недопустимо.
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Logging(#[from] crate::LoggingError),
}

impl ErrorExt for SettingsError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Load { .. } | Self::Invalid { .. } => StatusCode::InvalidConfig,
            Self::Logging(e) => e.status_code(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "settings".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Self::Invalid { field, .. } = self {
            tags.push(("field", field.to_string()));
        }
        tags
    }
}
