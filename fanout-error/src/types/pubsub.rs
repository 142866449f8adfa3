use std::fmt;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Причина срабатывания отмены.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelCause {
    /// Отмена вызвана явно.
    Canceled,
    /// Истёк дедлайн.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Canceled => write!(f, "canceled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Ошибка публикации: рассылка прервана отменой.
///
/// Оба варианта несут число подписчиков, успевших принять сообщение до
/// срабатывания отмены. Оставшиеся подписчики сообщение не получили.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Отмена вызвана явно.
    #[error("publish canceled after {delivered} deliveries")]
    Canceled { delivered: usize },

    /// Истёк дедлайн.
    #[error("publish deadline exceeded after {delivered} deliveries")]
    DeadlineExceeded { delivered: usize },
}

impl PublishError {
    /// Строит ошибку по причине отмены и числу доставок.
    pub fn from_cause(
        cause: CancelCause,
        delivered: usize,
    ) -> Self {
        match cause {
            CancelCause::Canceled => Self::Canceled { delivered },
            CancelCause::DeadlineExceeded => Self::DeadlineExceeded { delivered },
        }
    }

    /// Сколько подписчиков приняло сообщение до отмены.
    pub fn delivered(&self) -> usize {
        match self {
            Self::Canceled { delivered } | Self::DeadlineExceeded { delivered } => *delivered,
        }
    }

    pub fn cause(&self) -> CancelCause {
        match self {
            Self::Canceled { .. } => CancelCause::Canceled,
            Self::DeadlineExceeded { .. } => CancelCause::DeadlineExceeded,
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

impl ErrorExt for PublishError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Canceled { .. } => StatusCode::Canceled,
            Self::DeadlineExceeded { .. } => StatusCode::DeadlineExceeded,
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", "pubsub_publish".to_string()),
            ("status_code", self.status_code().to_string()),
            ("delivered", self.delivered().to_string()),
        ]
    }
}
