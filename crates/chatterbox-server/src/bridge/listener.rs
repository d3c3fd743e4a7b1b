//! Bus listener and its supervisor.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::BroadcastBridge;
use crate::metrics::BUS_LISTENER_RESTARTS_TOTAL;

/// Keep one listener alive until the bridge is stopped.
///
/// A listener that ends without cancellation has panicked; it is logged,
/// counted and respawned after the restart backoff.
#[instrument(skip_all, name = "bus_supervisor")]
pub(super) async fn supervise(bridge: Arc<BroadcastBridge>) {
    let cancel = bridge.cancel.clone();
    loop {
        let handle = tokio::spawn(run_listener(Arc::clone(&bridge)));
        match handle.await {
            Ok(()) => break,
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                error!(error = %e, "bus listener died, restarting");
                counter!(BUS_LISTENER_RESTARTS_TOTAL).increment(1);
                if !pause(&cancel, bridge.config.restart_backoff).await {
                    break;
                }
            }
        }
    }
    debug!("bus supervisor exiting");
}

/// Poll the bus and fan each message out until cancelled.
///
/// Bus errors never end the loop: a dead connection is replaced, anything
/// else is retried after the error backoff.
#[instrument(skip_all, name = "bus_listener")]
async fn run_listener(bridge: Arc<BroadcastBridge>) {
    let cancel = bridge.cancel.clone();
    info!("bus listener started");

    loop {
        let acquired = tokio::select! {
            () = cancel.cancelled() => break,
            bus = bridge.bus() => bus,
        };
        let bus = match acquired {
            Ok(bus) => bus,
            Err(e) => {
                warn!(error = %e, "bus unavailable");
                if !pause(&cancel, bridge.config.error_backoff).await {
                    break;
                }
                continue;
            }
        };

        let polled = tokio::select! {
            () = cancel.cancelled() => break,
            polled = bus.next_message(bridge.poll_timeout()) => polled,
        };

        match polled {
            Ok(Some(msg)) => {
                let _ = bridge.deliver(&msg);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "bus poll failed");
                if e.is_disconnect() {
                    if let Err(e) = bridge.reconnect(&bus).await {
                        warn!(error = %e, "bus reconnect failed");
                    }
                }
                if !pause(&cancel, bridge.config.error_backoff).await {
                    break;
                }
            }
        }
    }

    info!("bus listener stopped");
}

/// Sleep for `wait` unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, wait: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(wait) => true,
    }
}
