//! In-process bus.
//!
//! A [`MemoryBroker`] stands in for the external message broker. Every
//! [`MemoryBus`] connected to the same broker behaves like a separate server
//! process: it only sees messages on channels it subscribed to, and a publish
//! reaches every subscribed connection including the publisher's own.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bus::{Bus, BusConnector, BusMessage};
use crate::errors::BusError;

/// Per-connection inbox capacity.
const INBOX_CAPACITY: usize = 1024;

struct Subscriber {
    channels: HashSet<String>,
    tx: mpsc::Sender<BusMessage>,
}

#[derive(Default)]
struct BrokerInner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    connects: AtomicU64,
}

/// Shared in-process broker. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to this broker.
    pub fn connect(&self) -> MemoryBus {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.inner.connects.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let _ = self.inner.subscribers.lock().insert(
            id,
            Subscriber {
                channels: HashSet::new(),
                tx,
            },
        );
        MemoryBus {
            id,
            broker: self.clone(),
            rx: tokio::sync::Mutex::new(rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Total connections ever opened on this broker.
    pub fn connect_count(&self) -> u64 {
        self.inner.connects.load(Ordering::Relaxed)
    }

    /// Number of live connections subscribed to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .values()
            .filter(|s| s.channels.contains(channel))
            .count()
    }

    /// Deliver `payload` to every connection subscribed to `channel`.
    ///
    /// Returns the number of connections that received it.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        let subs = self.inner.subscribers.lock();
        let mut delivered = 0;
        for (id, sub) in subs.iter() {
            if !sub.channels.contains(channel) {
                continue;
            }
            if sub.tx.try_send(BusMessage::new(channel, payload)).is_ok() {
                delivered += 1;
            } else {
                warn!(conn = id, channel, "memory bus inbox full, dropping message");
            }
        }
        delivered
    }

    fn subscribe(&self, id: u64, channel: &str) -> bool {
        let mut subs = self.inner.subscribers.lock();
        match subs.get_mut(&id) {
            Some(sub) => {
                let _ = sub.channels.insert(channel.to_owned());
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: u64) {
        let _ = self.inner.subscribers.lock().remove(&id);
    }
}

/// One connection to a [`MemoryBroker`].
pub struct MemoryBus {
    id: u64,
    broker: MemoryBroker,
    rx: tokio::sync::Mutex<mpsc::Receiver<BusMessage>>,
    closed: AtomicBool,
}

impl MemoryBus {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        self.ensure_open()?;
        let receivers = self.broker.publish(channel, payload);
        debug!(channel, receivers, "memory bus publish");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), BusError> {
        self.ensure_open()?;
        if self.broker.subscribe(self.id, channel) {
            Ok(())
        } else {
            Err(BusError::Closed)
        }
    }

    async fn next_message(&self, wait: Duration) -> Result<Option<BusMessage>, BusError> {
        self.ensure_open()?;
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => Err(BusError::Closed),
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.remove(self.id);
        }
        Ok(())
    }
}

impl Drop for MemoryBus {
    fn drop(&mut self) {
        self.broker.remove(self.id);
    }
}

/// [`BusConnector`] that opens connections on a shared [`MemoryBroker`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    broker: MemoryBroker,
}

impl MemoryConnector {
    /// Create a connector for `broker`.
    pub fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }

    /// The underlying broker.
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

#[async_trait]
impl BusConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn Bus>, BusError> {
        Ok(Arc::new(self.broker.connect()))
    }
}
