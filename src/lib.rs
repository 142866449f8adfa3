/// Demo binary settings (defaults, `fanout.toml`, `FANOUT_*` environment).
pub mod config;
/// Logging setup on `tracing-subscriber` (formatting, filters).
pub mod logging;
/// Pub/Sub: Registry, Endpoint, Cancellation.
pub mod pubsub;

pub use fanout_error;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::Settings;
/// Error types and status codes.
pub use fanout_error::{
    CancelCause, ErrorExt, LogLevel, LoggingError, PublishError, SettingsError, StatusCode,
};
/// Logging configuration and initialization.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Keyed registry, subscriber endpoints and publish cancellation.
pub use pubsub::{bounded, unbounded, Cancellation, Closed, Endpoint, EndpointId, Mailbox, Registry};
