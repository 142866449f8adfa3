use std::fmt;

#[cfg(feature = "extras")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 1xxx: Общие ошибки
/// - 2xxx: Конфигурация
/// - 3xxx: Доставка сообщений
#[cfg_attr(feature = "extras", derive(AsRefStr, EnumIter))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 1xxx: Общие ошибки ===
    Internal = 1000,

    // === 2xxx: Конфигурация ===
    InvalidConfig = 2000,
    InvalidLogFilter = 2001,
    LoggingInitFailed = 2002,

    // === 3xxx: Доставка ===
    Canceled = 3000,
    DeadlineExceeded = 3001,
}

/// Уровень, на котором вызывающей стороне стоит залогировать ошибку.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Имеет ли смысл повторить операцию с новой отменой/дедлайном.
    ///
    /// Решение о повторе всегда принимает вызывающая сторона.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }

    /// Код описывает прерванную отменой доставку.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Canceled => LogLevel::Info,
            Self::DeadlineExceeded | Self::InvalidConfig | Self::InvalidLogFilter => LogLevel::Warn,
            Self::Internal | Self::LoggingInitFailed => LogLevel::Error,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "extras")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "extras"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
