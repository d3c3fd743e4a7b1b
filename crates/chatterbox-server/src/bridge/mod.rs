//! Broadcast bridge: local rooms ⇄ shared bus.
//!
//! Publishing never delivers locally. Every envelope goes out on the bus and
//! comes back through the listener, which is also how this process hears its
//! own traffic.

mod listener;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chatterbox_bus::{Bus, BusConnector, BusError, BusMessage};
use chatterbox_core::{ChannelNamer, Envelope, RoomId};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::metrics::{
    BUS_MALFORMED_TOTAL, BUS_MESSAGES_RECEIVED_TOTAL, BUS_PUBLISH_ERRORS_TOTAL, BUS_PUBLISH_TOTAL,
};
use crate::room::RoomRegistry;

/// Connects the local [`RoomRegistry`] to the shared bus.
///
/// Owns the single bus connection, the set of subscribed room channels and
/// the supervised listener task. Construct one per process and share it as
/// `Arc<BroadcastBridge>`.
pub struct BroadcastBridge {
    connector: Arc<dyn BusConnector>,
    registry: Arc<RoomRegistry>,
    namer: ChannelNamer,
    config: BridgeConfig,
    bus: RwLock<Option<Arc<dyn Bus>>>,
    connect_lock: tokio::sync::Mutex<()>,
    subscribe_lock: tokio::sync::Mutex<()>,
    subscriptions: Mutex<HashSet<RoomId>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl BroadcastBridge {
    /// Create a bridge. No bus connection is made until first use.
    pub fn new(
        connector: Arc<dyn BusConnector>,
        registry: Arc<RoomRegistry>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            connector,
            registry,
            namer: ChannelNamer::new(config.channel_prefix.clone()),
            config,
            bus: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            subscribe_lock: tokio::sync::Mutex::new(()),
            subscriptions: Mutex::new(HashSet::new()),
            supervisor: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// The registry this bridge fans out into.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Channel naming in use.
    pub fn namer(&self) -> &ChannelNamer {
        &self.namer
    }

    /// Rooms this process is subscribed to.
    pub fn subscriptions(&self) -> HashSet<RoomId> {
        self.subscriptions.lock().clone()
    }

    /// Number of subscribed rooms.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Whether the listener supervisor has been started.
    pub fn is_running(&self) -> bool {
        self.supervisor.lock().is_some()
    }

    // ── Bus connection ──────────────────────────────────────────────

    fn current_bus(&self) -> Option<Arc<dyn Bus>> {
        self.bus.read().clone()
    }

    /// Return the live bus connection, establishing it on first use.
    ///
    /// Concurrent first callers share one connection. A failed attempt
    /// leaves the slot empty so the next caller retries.
    async fn bus(&self) -> Result<Arc<dyn Bus>, BusError> {
        if self.cancel.is_cancelled() {
            return Err(BusError::Closed);
        }
        if let Some(bus) = self.current_bus() {
            return Ok(bus);
        }
        let _guard = self.connect_lock.lock().await;
        if let Some(bus) = self.current_bus() {
            return Ok(bus);
        }
        let bus = self.connect_and_resubscribe().await?;
        *self.bus.write() = Some(bus.clone());
        info!("bus connection established");
        Ok(bus)
    }

    /// Open a connection and subscribe it to every known room.
    async fn connect_and_resubscribe(&self) -> Result<Arc<dyn Bus>, BusError> {
        let bus = self.connector.connect().await?;
        let rooms = self.subscriptions();
        for room_id in &rooms {
            bus.subscribe(&self.namer.channel_for(room_id)).await?;
        }
        Ok(bus)
    }

    /// Replace `failed` with a fresh connection and resubscribe every room.
    ///
    /// If another caller already replaced it, the current connection is
    /// returned unchanged.
    async fn reconnect(&self, failed: &Arc<dyn Bus>) -> Result<Arc<dyn Bus>, BusError> {
        let _guard = self.connect_lock.lock().await;
        {
            let mut slot = self.bus.write();
            match slot.as_ref() {
                Some(current) if !Arc::ptr_eq(current, failed) => return Ok(current.clone()),
                _ => *slot = None,
            }
        }
        if let Err(e) = failed.close().await {
            debug!(error = %e, "closing failed bus connection");
        }
        if self.cancel.is_cancelled() {
            return Err(BusError::Closed);
        }

        let bus = self.connect_and_resubscribe().await?;
        *self.bus.write() = Some(bus.clone());
        info!(rooms = self.subscription_count(), "bus connection re-established");
        Ok(bus)
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Subscribe this process to `room_id`'s channel and make sure the
    /// listener is running. Repeated and concurrent calls are safe.
    pub async fn ensure_subscribed(self: &Arc<Self>, room_id: &RoomId) -> Result<(), BusError> {
        if !self.subscriptions.lock().contains(room_id) {
            let _guard = self.subscribe_lock.lock().await;
            if !self.subscriptions.lock().contains(room_id) {
                self.subscribe(room_id).await?;
            }
        }
        self.start();
        Ok(())
    }

    async fn subscribe(&self, room_id: &RoomId) -> Result<(), BusError> {
        let channel = self.namer.channel_for(room_id);
        let bus = self.bus().await?;
        bus.subscribe(&channel).await?;
        let _ = self.subscriptions.lock().insert(room_id.clone());

        // A reconnect may have snapshotted subscriptions before the insert.
        // Holding the connect lock waits it out so the slot is final.
        let _guard = self.connect_lock.lock().await;
        if let Some(current) = self.current_bus() {
            if !Arc::ptr_eq(&current, &bus) {
                current.subscribe(&channel).await?;
            }
        }
        info!(room_id = %room_id, channel, "subscribed to room channel");
        Ok(())
    }

    // ── Publishing ──────────────────────────────────────────────────

    /// Publish `envelope` on its room's channel.
    ///
    /// Returns whether the bus accepted it. Failures are logged and the
    /// envelope is dropped.
    pub async fn publish(&self, envelope: &Envelope) -> bool {
        let kind = envelope.kind().as_str();
        let room_id = envelope.room_id();
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(room_id = %room_id, kind, error = %e, "failed to encode envelope");
                counter!(BUS_PUBLISH_ERRORS_TOTAL).increment(1);
                return false;
            }
        };
        let channel = self.namer.channel_for(room_id);

        let bus = match self.bus().await {
            Ok(bus) => bus,
            Err(e) => {
                warn!(room_id = %room_id, kind, error = %e, "bus unavailable, dropping envelope");
                counter!(BUS_PUBLISH_ERRORS_TOTAL).increment(1);
                return false;
            }
        };

        match bus.publish(&channel, &payload).await {
            Ok(()) => {
                debug!(room_id = %room_id, kind, channel, "envelope published");
                counter!(BUS_PUBLISH_TOTAL, "kind" => kind).increment(1);
                true
            }
            Err(e) => {
                warn!(room_id = %room_id, kind, channel, error = %e, "publish failed, dropping envelope");
                counter!(BUS_PUBLISH_ERRORS_TOTAL).increment(1);
                false
            }
        }
    }

    // ── Delivery ────────────────────────────────────────────────────

    /// Decode one bus message and fan it out to the room's local sockets.
    ///
    /// Returns the number of local deliveries, or `None` if the message was
    /// malformed and dropped.
    pub fn deliver(&self, msg: &BusMessage) -> Option<usize> {
        counter!(BUS_MESSAGES_RECEIVED_TOTAL).increment(1);

        let Some(room_id) = self.namer.room_for(&msg.channel) else {
            warn!(channel = %msg.channel, "message on unrecognized channel, dropping");
            counter!(BUS_MALFORMED_TOTAL).increment(1);
            return None;
        };
        let envelope = match Envelope::decode(&msg.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(channel = %msg.channel, error = %e, "malformed envelope, dropping");
                counter!(BUS_MALFORMED_TOTAL).increment(1);
                return None;
            }
        };
        if envelope.room_id() != &room_id {
            warn!(
                channel = %msg.channel,
                envelope_room = %envelope.room_id(),
                "envelope room does not match channel, dropping"
            );
            counter!(BUS_MALFORMED_TOTAL).increment(1);
            return None;
        }
        let text = match envelope.to_client_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "failed to render envelope, dropping");
                counter!(BUS_MALFORMED_TOTAL).increment(1);
                return None;
            }
        };

        let delivered = self.registry.fan_out_local(&room_id, &text);
        debug!(room_id = %room_id, kind = envelope.kind().as_str(), delivered, "envelope delivered");
        Some(delivered)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start the supervised listener. Does nothing if it is already running
    /// or the bridge has been stopped.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.supervisor.lock();
        if slot.is_some() || self.cancel.is_cancelled() {
            return;
        }
        *slot = Some(tokio::spawn(listener::supervise(Arc::clone(self))));
        info!("bus listener supervisor started");
    }

    /// Stop the listener, then unsubscribe and close the bus connection.
    ///
    /// Safe to call when never started and safe to call more than once.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let supervisor = self.supervisor.lock().take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                warn!(error = %e, "bus listener supervisor ended abnormally");
            }
        }

        let bus = self.bus.write().take();
        if let Some(bus) = bus {
            match bus.close().await {
                Ok(()) => info!("bus connection closed"),
                Err(e) => warn!(error = %e, "failed to close bus connection"),
            }
        }
    }

    fn poll_timeout(&self) -> Duration {
        self.config.poll_timeout
    }
}
