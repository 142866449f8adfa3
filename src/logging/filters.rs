use fanout_error::LoggingError;
use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Строит фильтр: `RUST_LOG`, если задан и корректен, иначе директива из
/// конфигурации.
pub fn build_filter_from_config(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    resolve_filter(config, env.as_deref())
}

fn resolve_filter(
    config: &LoggingConfig,
    env_directive: Option<&str>,
) -> Result<EnvFilter, LoggingError> {
    if let Some(directive) = env_directive.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directive) {
            Ok(filter) => return Ok(filter),
            Err(e) => {
                eprintln!(
                    "Invalid {} directive ('{directive}'): {e}; using configuration",
                    EnvFilter::DEFAULT_ENV
                );
            }
        }
    }

    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidFilter {
        reason: e.to_string(),
        directive,
    })
}
