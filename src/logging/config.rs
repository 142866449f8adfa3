use std::{fmt, str::FromStr};

use fanout_error::LoggingError;
use serde::{Deserialize, Serialize};

/// Уровни, допустимые в `LoggingConfig::level`.
const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(LoggingError::InvalidFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень для всех целей
    pub level: String,
    /// Формат вывода в консоль
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
    /// Дополнительные директивы EnvFilter, например `fanout::pubsub=trace`
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    pub const ENV_LEVEL: &'static str = "FANOUT_LOG_LEVEL";
    pub const ENV_FORMAT: &'static str = "FANOUT_LOG_FORMAT";

    /// Переопределяет уровень и формат из переменных окружения.
    pub fn apply_env_overrides(&mut self) -> Result<(), LoggingError> {
        self.apply_overrides_with(|name| std::env::var(name).ok())
    }

    /// То же, что `apply_env_overrides`, но с произвольным источником значений.
    pub fn apply_overrides_with<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(Self::ENV_LEVEL) {
            self.level = level.trim().to_ascii_lowercase();
        }
        if let Some(format) = lookup(Self::ENV_FORMAT) {
            self.format = format.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        let level = self.level.trim().to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(LoggingError::InvalidLevel {
                level: self.level.clone(),
            });
        }
        Ok(())
    }

    /// Собирает директиву EnvFilter: базовый уровень, затем дополнительные
    /// директивы через запятую.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = vec![self.level.trim().to_ascii_lowercase()];
        parts.extend(
            self.directives
                .iter()
                .map(|d| d.trim())
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        );
        parts.join(",")
    }
}
