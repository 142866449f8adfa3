pub mod logging;
pub mod pubsub;
pub mod settings;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use logging::*;
pub use pubsub::*;
pub use settings::*;
