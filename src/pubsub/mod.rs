//! Подсистема Publish–Subscribe.
//!
//! - `registry`: индекс подписок и рассылка сообщений с отменой.
//! - `endpoint`: конечные точки подписчиков и способность `Mailbox`.
//! - `cancel`: явная отмена и дедлайн публикации.

pub mod cancel;
pub mod endpoint;
pub mod registry;

pub use cancel::*;
pub use endpoint::*;
pub use registry::*;
