//! Отмена публикации: явный триггер плюс необязательный дедлайн.
//!
//! [`Cancellation`] передаётся в [`Registry::publish`](super::Registry::publish)
//! и проверяется только на границах передачи сообщения подписчику. Реестр не
//! заводит собственных таймеров: дедлайн ожидается внутри future вызывающего.

use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

pub use fanout_error::CancelCause;

/// Токен отмены с необязательным дедлайном.
///
/// Клоны разделяют один и тот же триггер: `cancel()` на любом клоне
/// прерывает все публикации, получившие этот токен. `Default` никогда не
/// срабатывает сам по себе.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Отмена без дедлайна; срабатывает только по `cancel()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Оборачивает существующий токен (например, токен завершения задачи).
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new().deadline(deadline)
    }

    /// Дедлайн через `timeout` от текущего момента.
    ///
    /// Если `Instant::now() + timeout` не представим, дедлайн не ставится.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Устанавливает дедлайн. При повторном вызове остаётся более ранний.
    pub fn deadline(
        mut self,
        deadline: Instant,
    ) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn timeout(
        self,
        timeout: Duration,
    ) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.deadline(deadline),
            None => self,
        }
    }

    /// Дочерняя отмена: срабатывает вместе с родителем, но её собственный
    /// `cancel()` родителя не затрагивает. Дедлайн наследуется.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Явно отменяет все публикации, использующие этот токен.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    /// Сработала ли отмена (явно или по дедлайну).
    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// Причина срабатывания, если отмена уже произошла.
    ///
    /// Явная отмена имеет приоритет над истёкшим дедлайном.
    pub fn cause(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            return Some(CancelCause::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// Ожидает срабатывания отмены и возвращает его причину.
    ///
    /// Без дедлайна и без `cancel()` никогда не завершается.
    pub async fn fired(&self) -> CancelCause {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => CancelCause::Canceled,
                _ = time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CancelCause::Canceled
            }
        }
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self::from_token(token)
    }
}
