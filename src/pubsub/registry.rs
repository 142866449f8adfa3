//! Реестр подписок и рассылка сообщений.
//!
//! Индекс `ключ → множество конечных точек` защищён одним
//! `tokio::sync::RwLock`:
//! - `subscribe` / `unsubscribe` берут блокировку на запись на весь вызов,
//!   поэтому пакетная подписка на несколько ключей атомарна;
//! - `publish` держит блокировку на чтение всё время рассылки, включая
//!   ожидание медленного подписчика. Зависший подписчик задерживает любые
//!   изменения индекса, а другие публикации только на захвате блокировки.
//!
//! Порядок обхода подписчиков одного ключа не определён.

use std::{borrow::Borrow, hash::Hash, time::Duration};

use ahash::{AHashMap, AHashSet};
use fanout_error::PublishError;
use tokio::sync::RwLock;

use super::{Cancellation, Endpoint};

type SubscriberSet<T> = AHashSet<Endpoint<T>>;

/// Реестр публикации/подписки.
///
/// `K` — ключ (тема), `T` — сообщение. Реестр не создаёт, не закрывает и не
/// опрашивает конечные точки: он только хранит их клоны.
pub struct Registry<K, T> {
    /// Ключ присутствует тогда и только тогда, когда у него есть подписчики.
    index: RwLock<AHashMap<K, SubscriberSet<T>>>,
}

impl<K, T> Registry<K, T>
where
    K: Eq + Hash + Send + Sync,
    T: Clone + Send + 'static,
{
    /// Пустой реестр без ключей и подписчиков.
    pub fn new() -> Self {
        Self {
            index: RwLock::new(AHashMap::new()),
        }
    }

    /// Подписывает `endpoint` на каждый ключ из `keys`.
    ///
    /// Повторная подписка той же конечной точки на тот же ключ ничего не
    /// меняет. Пустой набор ключей допустим.
    pub async fn subscribe<I>(
        &self,
        keys: I,
        endpoint: &Endpoint<T>,
    ) where
        I: IntoIterator,
        I::Item: Into<K>,
    {
        let mut index = self.index.write().await;
        for key in keys {
            index.entry(key.into()).or_default().insert(endpoint.clone());
        }
    }

    /// Отписывает `endpoint` от каждого ключа из `keys`.
    ///
    /// Если у ключа не осталось подписчиков, ключ удаляется. Отсутствующий
    /// ключ или неподписанная конечная точка молча пропускаются.
    pub async fn unsubscribe<'a, I, Q>(
        &self,
        keys: I,
        endpoint: &Endpoint<T>,
    ) where
        I: IntoIterator<Item = &'a Q>,
        Q: Hash + Eq + ?Sized + 'a,
        K: Borrow<Q>,
    {
        let mut index = self.index.write().await;
        for key in keys {
            let Some(subscribers) = index.get_mut(key) else {
                continue;
            };
            subscribers.remove(endpoint);
            if subscribers.is_empty() {
                index.remove(key);
            }
        }
    }

    /// Рассылает `msg` всем подписчикам `key`.
    ///
    /// Каждому подписчику по очереди передаётся клон сообщения с ожиданием
    /// свободного места. Ожидание прерывается срабатыванием `cancel`: тогда
    /// возвращается ошибка с числом уже выполненных доставок, а оставшиеся
    /// подписчики сообщение не получают. Повторных попыток нет.
    ///
    /// Неизвестный ключ даёт `Ok(0)`. Конечная точка без читателя
    /// пропускается и не учитывается в счётчике.
    pub async fn publish<Q>(
        &self,
        cancel: &Cancellation,
        key: &Q,
        msg: T,
    ) -> Result<usize, PublishError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.index.read().await;
        let Some(subscribers) = index.get(key) else {
            return Ok(0);
        };

        let mut delivered = 0usize;

        for endpoint in subscribers.iter() {
            if let Some(cause) = cancel.cause() {
                return Err(PublishError::from_cause(cause, delivered));
            }

            tokio::select! {
                biased;
                cause = cancel.fired() => {
                    return Err(PublishError::from_cause(cause, delivered));
                }
                res = endpoint.deliver(msg.clone()) => {
                    // Ящик без читателя пропускается и не учитывается.
                    if res.is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        Ok(delivered)
    }

    /// [`publish`](Self::publish) с дедлайном через `timeout` от начала
    /// вызова.
    pub async fn publish_with_timeout<Q>(
        &self,
        key: &Q,
        msg: T,
        timeout: Duration,
    ) -> Result<usize, PublishError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let cancel = Cancellation::with_timeout(timeout);
        self.publish(&cancel, key, msg).await
    }

    /// Число подписчиков ключа (0 для неизвестного ключа).
    pub async fn subscriber_count<Q>(
        &self,
        key: &Q,
    ) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index
            .read()
            .await
            .get(key)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Есть ли у ключа хотя бы один подписчик.
    pub async fn contains_key<Q>(
        &self,
        key: &Q,
    ) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.read().await.contains_key(key)
    }

    /// Подписана ли `endpoint` на `key`.
    pub async fn is_subscribed<Q>(
        &self,
        key: &Q,
        endpoint: &Endpoint<T>,
    ) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index
            .read()
            .await
            .get(key)
            .is_some_and(|subscribers| subscribers.contains(endpoint))
    }

    /// Число ключей, у которых есть хотя бы один подписчик.
    pub async fn key_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// `true`, если ни на один ключ никто не подписан.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }
}

impl<K, T> Default for Registry<K, T>
where
    K: Eq + Hash + Send + Sync,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use rstest::rstest;
    use tokio::{
        sync::mpsc,
        time::{sleep, timeout},
    };

    use super::*;
    use crate::pubsub::{bounded, unbounded, CancelCause, Closed, Mailbox};

    /// Ящик, который принимает сообщение и после `limit` доставок (по всем
    /// ящикам с общим счётчиком) явно отменяет публикацию.
    struct CancelAfter {
        accepted: Arc<AtomicUsize>,
        limit: usize,
        cancel: Cancellation,
    }

    #[async_trait]
    impl Mailbox<u32> for CancelAfter {
        async fn deliver(
            &self,
            _msg: u32,
        ) -> Result<(), Closed<u32>> {
            let n = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.limit {
                self.cancel.cancel();
            }
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    /// Конечная точка с заполненным буфером ёмкостью 1: без читателя
    /// следующая доставка ждёт бесконечно.
    async fn stalled_endpoint() -> (Endpoint<&'static str>, mpsc::Receiver<&'static str>) {
        let (ep, rx) = bounded(1);
        ep.deliver("filler").await.unwrap();
        (ep, rx)
    }

    struct CaptureWriter(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Тест проверяет, что реестр ничего не пишет в лог даже на уровне
    /// `TRACE`: подписка, доставка, пропуск закрытого ящика, отмена и
    /// отписка наблюдаемы только через возвращаемые значения.
    #[tokio::test]
    async fn test_registry_emits_no_events() {
        let buffer = Arc::new(std::sync::Mutex::new(Vec::new()));
        let writer = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || CaptureWriter(Arc::clone(&writer)))
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let registry: Registry<String, u32> = Registry::new();
        let (open, _rx_open) = unbounded();
        let (closed, rx_closed) = unbounded();
        drop(rx_closed);

        registry.subscribe(["k"], &open).await;
        registry.subscribe(["k"], &closed).await;
        assert_eq!(registry.publish(&Cancellation::new(), "k", 1).await, Ok(1));

        let cancel = Cancellation::new();
        cancel.cancel();
        assert!(registry.publish(&cancel, "k", 2).await.is_err());

        registry.unsubscribe(["k"], &open).await;
        registry.unsubscribe(["k"], &closed).await;

        tracing::trace!("capture works");
        let out = String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned();
        assert_eq!(out.lines().count(), 1, "unexpected output: {out}");
        assert!(out.contains("capture works"));
    }

    /// Тест проверяет, что повторная подписка не создаёт дубликат, а одна
    /// отписка удаляет подписку полностью.
    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let registry: Registry<String, u32> = Registry::new();
        let (ep, _rx) = unbounded();

        registry.subscribe(["topic"], &ep).await;
        registry.subscribe(["topic"], &ep).await;
        registry.subscribe(["topic", "topic"], &ep.clone()).await;
        assert_eq!(registry.subscriber_count("topic").await, 1);
        assert!(registry.is_subscribed("topic", &ep).await);

        registry.unsubscribe(["topic"], &ep).await;
        assert_eq!(registry.subscriber_count("topic").await, 0);
        assert!(!registry.contains_key("topic").await);
    }

    /// Тест проверяет удаление ключа после ухода последнего подписчика.
    #[tokio::test]
    async fn test_last_unsubscribe_removes_key() {
        let registry: Registry<String, u32> = Registry::new();
        let (a, _rx_a) = unbounded();
        let (b, _rx_b) = unbounded();

        registry.subscribe(["k"], &a).await;
        registry.subscribe(["k"], &b).await;
        assert_eq!(registry.key_count().await, 1);

        registry.unsubscribe(["k"], &a).await;
        assert!(registry.contains_key("k").await);
        assert_eq!(registry.subscriber_count("k").await, 1);

        registry.unsubscribe(["k"], &b).await;
        assert!(!registry.contains_key("k").await);
        assert!(registry.is_empty().await);

        // Неотличимо от ключа, на который никто не подписывался.
        let res = registry.publish(&Cancellation::new(), "k", 1).await;
        assert_eq!(res, Ok(0));
    }

    /// Тест проверяет, что отписка неизвестного ключа или неподписанной
    /// конечной точки ничего не ломает.
    #[tokio::test]
    async fn test_unsubscribe_unknown_is_noop() {
        let registry: Registry<String, u32> = Registry::new();
        let (a, _rx_a) = unbounded();
        let (b, _rx_b) = unbounded();

        registry.subscribe(["k"], &a).await;
        registry.unsubscribe(["missing"], &a).await;
        registry.unsubscribe(["k"], &b).await;
        registry.unsubscribe(std::iter::empty::<&str>(), &a).await;

        assert_eq!(registry.subscriber_count("k").await, 1);
        assert_eq!(registry.key_count().await, 1);
    }

    /// Тест проверяет пакетную подписку одной конечной точки на несколько
    /// ключей и выборочную отписку.
    #[tokio::test]
    async fn test_batch_subscribe_and_partial_unsubscribe() {
        let registry: Registry<String, u32> = Registry::new();
        let (ep, mut rx) = unbounded();

        registry.subscribe(["a", "b", "c"], &ep).await;
        assert_eq!(registry.key_count().await, 3);

        let keys = vec!["a".to_string(), "c".to_string()];
        registry.unsubscribe(&keys, &ep).await;
        assert_eq!(registry.key_count().await, 1);
        assert!(registry.is_subscribed("b", &ep).await);

        assert_eq!(registry.publish(&Cancellation::new(), "b", 5).await, Ok(1));
        assert_eq!(registry.publish(&Cancellation::new(), "a", 6).await, Ok(0));
        assert_eq!(rx.recv().await, Some(5));
        assert!(rx.try_recv().is_err());
    }

    /// Тест проверяет полную доставку N подписчикам без отмены: каждый
    /// получает сообщение ровно один раз.
    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    #[tokio::test]
    async fn test_fanout_reaches_every_subscriber(#[case] n: usize) {
        let registry: Registry<&'static str, String> = Registry::new();
        let mut receivers = Vec::with_capacity(n);
        for _ in 0..n {
            let (ep, rx) = bounded(1);
            registry.subscribe(["news"], &ep).await;
            receivers.push(rx);
        }

        let res = registry
            .publish(&Cancellation::new(), "news", "hello".to_string())
            .await;
        assert_eq!(res, Ok(n));

        for mut rx in receivers {
            assert_eq!(rx.recv().await.as_deref(), Some("hello"));
            assert!(rx.try_recv().is_err(), "ровно одна доставка");
        }
    }

    /// Тест проверяет доставку медленным читателям: публикация ждёт, пока
    /// каждый из них примет сообщение.
    #[tokio::test(start_paused = true)]
    async fn test_publish_waits_for_slow_readers() {
        let registry: Registry<String, u32> = Registry::new();
        let mut readers = Vec::new();
        for delay in [5u64, 20, 50] {
            let (ep, mut rx) = stalled_endpoint_u32().await;
            registry.subscribe(["slow"], &ep).await;
            readers.push(tokio::spawn(async move {
                sleep(Duration::from_millis(delay)).await;
                let filler = rx.recv().await;
                let msg = rx.recv().await;
                (filler, msg)
            }));
        }

        let res = registry.publish(&Cancellation::new(), "slow", 42).await;
        assert_eq!(res, Ok(3));

        for reader in readers {
            assert_eq!(reader.await.unwrap(), (Some(0), Some(42)));
        }
    }

    async fn stalled_endpoint_u32() -> (Endpoint<u32>, mpsc::Receiver<u32>) {
        let (ep, rx) = bounded(1);
        ep.deliver(0).await.unwrap();
        (ep, rx)
    }

    /// Тест проверяет частичную доставку: после K принятых сообщений отмена
    /// прерывает рассылку, остальные N−K ничего не получают.
    #[rstest]
    #[case(5, 1)]
    #[case(5, 3)]
    #[case(8, 7)]
    #[tokio::test]
    async fn test_partial_delivery_on_cancel(
        #[case] n: usize,
        #[case] k: usize,
    ) {
        let registry: Registry<&'static str, u32> = Registry::new();
        let cancel = Cancellation::new();
        let accepted = Arc::new(AtomicUsize::new(0));

        for _ in 0..n {
            let ep = Endpoint::new(CancelAfter {
                accepted: Arc::clone(&accepted),
                limit: k,
                cancel: cancel.clone(),
            });
            registry.subscribe(["t"], &ep).await;
        }

        let res = registry.publish(&cancel, "t", 1).await;
        assert_eq!(res, Err(PublishError::Canceled { delivered: k }));
        assert_eq!(accepted.load(Ordering::SeqCst), k);
    }

    /// Тест проверяет, что уже отменённая публикация ничего не доставляет.
    #[tokio::test]
    async fn test_already_cancelled_delivers_nothing() {
        let registry: Registry<&'static str, u32> = Registry::new();
        let (ep, mut rx) = unbounded();
        registry.subscribe(["t"], &ep).await;

        let cancel = Cancellation::new();
        cancel.cancel();
        let res = registry.publish(&cancel, "t", 1).await;
        assert_eq!(res, Err(PublishError::Canceled { delivered: 0 }));
        assert!(rx.try_recv().is_err());
    }

    /// Тест проверяет, что неизвестный ключ — успех с нулём доставок, даже
    /// если отмена уже сработала.
    #[tokio::test]
    async fn test_unknown_key_is_noop_success() {
        let registry: Registry<String, u32> = Registry::new();
        assert_eq!(registry.publish(&Cancellation::new(), "nope", 1).await, Ok(0));

        let cancel = Cancellation::new();
        cancel.cancel();
        assert_eq!(registry.publish(&cancel, "nope", 1).await, Ok(0));
    }

    /// Тест проверяет дедлайн, когда ни один подписчик не читает.
    #[tokio::test(start_paused = true)]
    async fn test_deadline_with_stalled_subscribers() {
        let registry: Registry<&'static str, &'static str> = Registry::new();
        let (a, mut rx_a) = stalled_endpoint().await;
        let (b, mut rx_b) = stalled_endpoint().await;
        registry.subscribe(["topic1"], &a).await;
        registry.subscribe(["topic1"], &b).await;

        let res = registry
            .publish_with_timeout("topic1", "msg", Duration::from_millis(10))
            .await;
        assert_eq!(res, Err(PublishError::DeadlineExceeded { delivered: 0 }));

        // В ящиках только исходные заполнители.
        assert_eq!(rx_a.recv().await, Some("filler"));
        assert_eq!(rx_b.recv().await, Some("filler"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    /// Тест проверяет, что при одном готовом и одном зависшем подписчике
    /// результат совпадает с фактически доставленным, каким бы ни был порядок
    /// обхода.
    #[tokio::test(start_paused = true)]
    async fn test_deadline_count_matches_actual_deliveries() {
        let registry: Registry<&'static str, &'static str> = Registry::new();
        let (ready, mut rx_ready) = bounded(1);
        let (stalled, _rx_stalled) = stalled_endpoint().await;
        registry.subscribe(["mixed"], &ready).await;
        registry.subscribe(["mixed"], &stalled).await;

        let err = registry
            .publish_with_timeout("mixed", "m", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.cause(), CancelCause::DeadlineExceeded);

        let received = usize::from(rx_ready.try_recv().is_ok());
        assert_eq!(err.delivered(), received);
    }

    /// Тест проверяет, что конечная точка без читателя пропускается и не
    /// учитывается.
    #[tokio::test]
    async fn test_closed_endpoint_is_skipped() {
        let registry: Registry<&'static str, u32> = Registry::new();
        let (open, mut rx_open) = bounded(1);
        let (closed, rx_closed) = bounded(1);
        drop(rx_closed);
        registry.subscribe(["t"], &open).await;
        registry.subscribe(["t"], &closed).await;

        assert_eq!(registry.publish(&Cancellation::new(), "t", 9).await, Ok(1));
        assert_eq!(rx_open.recv().await, Some(9));
        // Реестр не отписывает закрытые конечные точки сам.
        assert_eq!(registry.subscriber_count("t").await, 2);
    }

    /// Тест проверяет, что отписка ждёт завершения идущей публикации.
    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_waits_for_inflight_publish() {
        let registry = Arc::new(Registry::<&'static str, &'static str>::new());
        let (ep, mut rx) = stalled_endpoint().await;
        registry.subscribe(["busy"], &ep).await;

        let publisher = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry.publish(&Cancellation::new(), "busy", "late").await
            })
        };
        // Даём публикации захватить блокировку и встать на ожидание.
        sleep(Duration::from_millis(1)).await;

        let unsubscriber = {
            let registry = Arc::clone(&registry);
            let ep = ep.clone();
            tokio::spawn(async move { registry.unsubscribe(["busy"], &ep).await })
        };
        sleep(Duration::from_millis(50)).await;
        assert!(!unsubscriber.is_finished(), "запись должна ждать читателя");
        assert!(!publisher.is_finished());

        assert_eq!(rx.recv().await, Some("filler"));
        assert_eq!(publisher.await.unwrap(), Ok(1));
        unsubscriber.await.unwrap();

        assert_eq!(rx.recv().await, Some("late"));
        assert!(!registry.contains_key("busy").await);
    }

    /// Тест проверяет, что публикации в разные ключи не мешают друг другу.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disjoint_keys() {
        let registry = Arc::new(Registry::<String, u64>::new());
        let mut readers = Vec::new();
        for key in ["left", "right"] {
            for _ in 0..4 {
                let (ep, mut rx) = bounded(1);
                registry.subscribe([key], &ep).await;
                readers.push(tokio::spawn(async move {
                    let mut sum = 0;
                    for _ in 0..50 {
                        sum += rx.recv().await.unwrap_or(0);
                    }
                    sum
                }));
            }
        }

        let publish_many = |key: &'static str| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 1..=50u64 {
                    let res = registry.publish(&Cancellation::new(), key, i).await;
                    assert_eq!(res, Ok(4));
                }
            })
        };
        let (left, right) = tokio::join!(publish_many("left"), publish_many("right"));
        left.unwrap();
        right.unwrap();

        for reader in readers {
            let sum = timeout(Duration::from_secs(5), reader)
                .await
                .expect("reader timed out")
                .unwrap();
            assert_eq!(sum, (1..=50).sum::<u64>());
        }
    }

    /// Тест проверяет сценарий с двумя темами и общей конечной точкой.
    #[tokio::test(start_paused = true)]
    async fn test_two_topics_scenario() {
        let registry: Registry<String, &'static str> = Registry::new();
        let (a, mut rx_a) = bounded(1);
        let (b, mut rx_b) = bounded(1);
        registry.subscribe(["topic1", "topic2"], &a).await;
        registry.subscribe(["topic1"], &b).await;

        let res = registry.publish(&Cancellation::new(), "topic1", "hello").await;
        assert_eq!(res, Ok(2));
        assert_eq!(rx_a.recv().await, Some("hello"));
        assert_eq!(rx_b.recv().await, Some("hello"));

        let res = registry.publish(&Cancellation::new(), "topic2", "only-a").await;
        assert_eq!(res, Ok(1));
        assert_eq!(rx_a.recv().await, Some("only-a"));
        assert!(rx_b.try_recv().is_err());
    }
}
