//! Process shutdown: stop accepting HTTP, drain the serve tasks, then take
//! the bridge off the bus.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::BroadcastBridge;

/// Outcome of [`ShutdownCoordinator::shutdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tracked tasks that were awaited.
    pub tasks: usize,
    /// Whether all of them finished inside the drain window.
    pub drained: bool,
}

/// Owns the server's cancellation token and the tasks that watch it.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    bridge: Arc<BroadcastBridge>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Coordinator for a server publishing through `bridge`.
    pub fn new(bridge: Arc<BroadcastBridge>) -> Self {
        Self {
            token: CancellationToken::new(),
            bridge,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the token without waiting for anything.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Await `handle` during the next [`shutdown`](Self::shutdown).
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Cancel, wait up to `drain` for tracked tasks, then stop the bridge.
    ///
    /// Tasks still running after `drain` are left detached. The bridge is
    /// stopped either way.
    pub async fn shutdown(&self, drain: Duration) -> ShutdownReport {
        self.trigger();

        let handles = std::mem::take(&mut *self.tasks.lock());
        let tasks = handles.len();
        info!(tasks, drain_ms = drain.as_millis(), "draining server tasks");

        let drained = tokio::time::timeout(drain, futures::future::join_all(handles))
            .await
            .is_ok();
        if !drained {
            warn!("server tasks still running after {drain:?}, detaching");
        }

        self.bridge.stop().await;
        ShutdownReport { tasks, drained }
    }
}
