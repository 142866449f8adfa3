//! Демонстрация реестра: читатели на нескольких темах, публикация с
//! дедлайном и корректное завершение.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use fanout::{
    bounded, init_logging, unbounded, Cancellation, Endpoint, ErrorExt, LogLevel, PublishError,
    Registry, Settings,
};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct Event {
    topic: Arc<str>,
    seq: usize,
}

enum Inbox {
    Bounded(mpsc::Receiver<Event>),
    Unbounded(mpsc::UnboundedReceiver<Event>),
}

impl Inbox {
    async fn recv(&mut self) -> Option<Event> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

fn endpoint(capacity: Option<usize>) -> (Endpoint<Event>, Inbox) {
    match capacity {
        Some(n) => {
            let (ep, rx) = bounded(n);
            (ep, Inbox::Bounded(rx))
        }
        None => {
            let (ep, rx) = unbounded();
            (ep, Inbox::Unbounded(rx))
        }
    }
}

async fn read(
    name: String,
    mut inbox: Inbox,
    delay: Duration,
) -> usize {
    let mut received = 0;
    while let Some(event) = inbox.recv().await {
        received += 1;
        debug!(reader = %name, topic = %event.topic, seq = event.seq, "received");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    received
}

fn log_truncated(
    topic: &str,
    seq: usize,
    err: &PublishError,
) {
    let code = err.status_code();
    let tags = err.metrics_tags();
    let message = err.client_message();
    match code.log_level() {
        LogLevel::Info => {
            info!(topic, seq, code = code.code(), ?tags, error = %message, "publish truncated")
        }
        LogLevel::Warn => {
            warn!(topic, seq, code = code.code(), ?tags, error = %message, "publish truncated")
        }
        LogLevel::Error => {
            error!(topic, seq, code = code.code(), ?tags, error = %message, "publish truncated")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_logging(settings.logging.clone()).context("failed to initialize logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = option_env!("GIT_COMMIT").unwrap_or("unknown"),
        build_time = option_env!("BUILD_TIME").unwrap_or("unknown"),
        topics = ?settings.topics,
        "fanout demo starting"
    );

    let registry: Registry<String, Event> = Registry::new();
    let shutdown = Cancellation::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, canceling publishes");
                shutdown.cancel();
            }
        });
    }

    let mut readers = JoinSet::new();
    let mut endpoints = Vec::new();
    for topic in &settings.topics {
        for n in 0..settings.subscribers_per_topic {
            let (ep, inbox) = endpoint(settings.bounded_capacity());
            registry.subscribe([topic.clone()], &ep).await;
            readers.spawn(read(format!("{topic}#{n}"), inbox, settings.reader_delay()));
            endpoints.push((topic.clone(), ep));
        }
    }

    let mut delivered = 0;
    let mut truncated = 0;
    'publish: for seq in 0..settings.messages {
        for topic in &settings.topics {
            let cancel = shutdown.child().timeout(settings.publish_timeout());
            let event = Event {
                topic: Arc::from(topic.as_str()),
                seq,
            };
            match registry.publish(&cancel, topic.as_str(), event).await {
                Ok(n) => delivered += n,
                Err(e) => {
                    delivered += e.delivered();
                    truncated += 1;
                    log_truncated(topic, seq, &e);
                    if shutdown.is_cancelled() {
                        break 'publish;
                    }
                }
            }
        }
    }

    for (topic, ep) in &endpoints {
        registry.unsubscribe([topic.as_str()], ep).await;
    }
    drop(endpoints);

    let mut received = 0;
    while let Some(count) = readers.join_next().await {
        received += count.context("reader task failed")?;
    }

    info!(delivered, received, truncated, "fanout demo finished");
    Ok(())
}
