//! Redis pub/sub backend.
//!
//! Publishing goes through a [`ConnectionManager`] (reconnects on its own).
//! Subscriptions use a dedicated pub/sub connection split into a sink for
//! `SUBSCRIBE`/`UNSUBSCRIBE` and a stream of incoming messages. When the
//! stream ends the connection is reported as [`BusError::Closed`] and the
//! caller is expected to open a fresh one.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::{ConnectionManager, PubSubSink, PubSubStream};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::bus::{Bus, BusConnector, BusMessage};
use crate::errors::BusError;

/// [`BusConnector`] for a Redis server.
#[derive(Clone, Debug)]
pub struct RedisConnector {
    url: String,
}

impl RedisConnector {
    /// Create a connector for `url` (e.g. `redis://localhost:6379`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The configured URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BusConnector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn Bus>, BusError> {
        let client =
            ::redis::Client::open(self.url.as_str()).map_err(|e| BusError::Connect(e.to_string()))?;
        let publisher = client
            .get_connection_manager()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        let pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        let (sink, stream) = pubsub.split();
        info!(url = %self.url, "redis connection initialized");
        Ok(Arc::new(RedisBus {
            publisher,
            sink: tokio::sync::Mutex::new(sink),
            stream: tokio::sync::Mutex::new(stream),
            channels: parking_lot::Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A live Redis pub/sub connection.
pub struct RedisBus {
    publisher: ConnectionManager,
    sink: tokio::sync::Mutex<PubSubSink>,
    stream: tokio::sync::Mutex<PubSubStream>,
    channels: parking_lot::Mutex<HashSet<String>>,
    closed: AtomicBool,
}

impl RedisBus {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        self.ensure_open()?;
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| BusError::Publish {
                channel: channel.to_owned(),
                message: e.to_string(),
            })?;
        debug!(channel, receivers, "published to redis");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), BusError> {
        self.ensure_open()?;
        self.sink
            .lock()
            .await
            .subscribe(channel)
            .await
            .map_err(|e| BusError::Subscribe {
                channel: channel.to_owned(),
                message: e.to_string(),
            })?;
        let _ = self.channels.lock().insert(channel.to_owned());
        Ok(())
    }

    async fn next_message(&self, wait: Duration) -> Result<Option<BusMessage>, BusError> {
        self.ensure_open()?;
        let mut stream = self.stream.lock().await;
        let msg = match tokio::time::timeout(wait, stream.next()).await {
            Err(_) => return Ok(None),
            Ok(None) => {
                warn!("redis pubsub stream ended");
                return Err(BusError::Closed);
            }
            Ok(Some(msg)) => msg,
        };
        let channel = msg.get_channel_name().to_owned();
        let payload: String = msg
            .get_payload()
            .map_err(|e| BusError::Receive(format!("non-text payload on {channel}: {e}")))?;
        Ok(Some(BusMessage { channel, payload }))
    }

    async fn close(&self) -> Result<(), BusError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let channels: Vec<String> = self.channels.lock().drain().collect();
        if channels.is_empty() {
            return Ok(());
        }
        self.sink
            .lock()
            .await
            .unsubscribe(channels.clone())
            .await
            .map_err(|e| BusError::Subscribe {
                channel: channels.join(","),
                message: e.to_string(),
            })?;
        info!(count = channels.len(), "redis channels unsubscribed");
        Ok(())
    }
}
