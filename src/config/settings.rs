use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use fanout_error::SettingsError;
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Настройки демонстрационного бинарника `fanout`.
///
/// Источники по возрастанию приоритета: значения по умолчанию, файл
/// `fanout.toml` (необязательный), переменные окружения `FANOUT_*`
/// (вложенные поля через `__`, например `FANOUT_LOGGING__LEVEL`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Темы, на которые подписываются читатели
    pub topics: Vec<String>,
    pub subscribers_per_topic: usize,
    /// Ёмкость ящика каждого подписчика; 0 — без ограничения
    pub mailbox_capacity: usize,
    /// Сколько сообщений опубликовать в каждую тему
    pub messages: usize,
    pub publish_timeout_ms: u64,
    /// Пауза читателя после каждого сообщения
    pub reader_delay_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            topics: vec!["alerts".to_string(), "metrics".to_string()],
            subscribers_per_topic: 3,
            mailbox_capacity: 1,
            messages: 10,
            publish_timeout_ms: 100,
            reader_delay_ms: 5,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub const ENV_PREFIX: &'static str = "FANOUT";
    pub const DEFAULT_FILE: &'static str = "fanout";

    /// Загружает настройки из `fanout.toml` и окружения.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(Some(Self::DEFAULT_FILE))
    }

    /// Загружает настройки; `file` — имя файла без расширения.
    pub fn load_from(file: Option<&str>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(name) = file {
            builder = builder.add_source(File::with_name(name).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(Self::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("topics")
                .with_list_parse_key("logging.directives")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    /// Собирает настройки поверх значений по умолчанию из заданных источников.
    pub(crate) fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let defaults = Config::try_from(&Settings::default()).map_err(load_error)?;

        let settings: Settings = Config::builder()
            .add_source(defaults)
            .add_source(builder.build().map_err(load_error)?)
            .build()
            .map_err(load_error)?
            .try_deserialize()
            .map_err(load_error)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.topics.is_empty() {
            return Err(invalid("topics", "must not be empty"));
        }
        if self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err(invalid("topics", "topic names must not be blank"));
        }
        if self.subscribers_per_topic == 0 {
            return Err(invalid("subscribers_per_topic", "must be at least 1"));
        }
        if self.publish_timeout_ms == 0 {
            return Err(invalid("publish_timeout_ms", "must be positive"));
        }
        self.logging.validate()?;
        Ok(())
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn reader_delay(&self) -> Duration {
        Duration::from_millis(self.reader_delay_ms)
    }

    /// Ёмкость ограниченного ящика; `None` — ящик без ограничения.
    pub fn bounded_capacity(&self) -> Option<usize> {
        (self.mailbox_capacity > 0).then_some(self.mailbox_capacity)
    }
}

fn load_error(e: config::ConfigError) -> SettingsError {
    SettingsError::Load {
        reason: e.to_string(),
    }
}

fn invalid(
    field: &'static str,
    reason: &str,
) -> SettingsError {
    SettingsError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
