//! Конечные точки подписчиков.
//!
//! [`Mailbox`] — минимальная способность принять сообщение, ожидая свободного
//! места. [`Endpoint`] — разделяемая ссылка на почтовый ящик с собственной
//! идентичностью: именно по ней реестр отличает подписчиков друг от друга.
//!
//! Реестр никогда не создаёт и не закрывает конечные точки. Функции
//! [`bounded`] и [`unbounded`] предназначены для вызывающей стороны.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Почтовый ящик больше не принимает сообщения (читатель исчез).
///
/// Возвращает сообщение вызывающему.
pub struct Closed<T>(pub T);

impl<T> Closed<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Closed<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Closed").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Closed<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "endpoint closed")
    }
}

impl<T> std::error::Error for Closed<T> {}

/// Способность принять сообщение с ожиданием.
///
/// `deliver` должен быть cancel-safe: если future уничтожен до завершения,
/// сообщение не должно оказаться в ящике.
#[async_trait]
pub trait Mailbox<T>: Send + Sync + 'static {
    /// Ожидает, пока ящик примет сообщение.
    ///
    /// Возвращает `Err(Closed(msg))`, если принять сообщение уже невозможно.
    async fn deliver(
        &self,
        msg: T,
    ) -> Result<(), Closed<T>>;

    /// `true`, если ящик заведомо больше ничего не примет.
    fn is_closed(&self) -> bool;
}

#[async_trait]
impl<T: Send + 'static> Mailbox<T> for mpsc::Sender<T> {
    async fn deliver(
        &self,
        msg: T,
    ) -> Result<(), Closed<T>> {
        self.send(msg)
            .await
            .map_err(|mpsc::error::SendError(msg)| Closed(msg))
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

#[async_trait]
impl<T: Send + 'static> Mailbox<T> for mpsc::UnboundedSender<T> {
    async fn deliver(
        &self,
        msg: T,
    ) -> Result<(), Closed<T>> {
        self.send(msg)
            .map_err(|mpsc::error::SendError(msg)| Closed(msg))
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Идентификатор конечной точки, уникальный в пределах процесса.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    fn next() -> Self {
        Self(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ep-{}", self.0)
    }
}

/// Конечная точка подписчика.
///
/// Клоны разделяют идентичность и почтовый ящик. Два `Endpoint::new` поверх
/// клонов одного `Sender` дают две разные конечные точки. Сравнение и хеш
/// выполняются только по [`EndpointId`].
pub struct Endpoint<T> {
    id: EndpointId,
    mailbox: Arc<dyn Mailbox<T>>,
}

impl<T: Send + 'static> Endpoint<T> {
    pub fn new<M: Mailbox<T>>(mailbox: M) -> Self {
        Self::from_arc(Arc::new(mailbox))
    }

    pub fn from_arc(mailbox: Arc<dyn Mailbox<T>>) -> Self {
        Self {
            id: EndpointId::next(),
            mailbox,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Передаёт сообщение в ящик, ожидая свободного места.
    pub async fn deliver(
        &self,
        msg: T,
    ) -> Result<(), Closed<T>> {
        self.mailbox.deliver(msg).await
    }
}

impl<T> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

impl<T> PartialEq for Endpoint<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Endpoint<T> {}

impl<T> Hash for Endpoint<T> {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.id.hash(state);
    }
}

impl<T: 'static> fmt::Debug for Endpoint<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("closed", &self.mailbox.is_closed())
            .finish()
    }
}

/// Конечная точка над `tokio::sync::mpsc::channel(capacity)`.
///
/// # Panics
/// Паникует при `capacity == 0`, как и `mpsc::channel`.
pub fn bounded<T: Send + 'static>(capacity: usize) -> (Endpoint<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Endpoint::new(tx), rx)
}

/// Конечная точка над `tokio::sync::mpsc::unbounded_channel()`.
pub fn unbounded<T: Send + 'static>() -> (Endpoint<T>, mpsc::UnboundedReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Endpoint::new(tx), rx)
}
