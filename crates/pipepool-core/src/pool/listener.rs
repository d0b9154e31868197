//! Per-slot listener loop and per-connection dispatch.
//!
//! ```text
//! loop:
//!     create endpoint
//!     wait for peer  | cancellation → exit
//!     spawn dispatch unit (handler → disconnect → release)
//! ```
//!
//! The loop never waits on a dispatch unit, so a slow or failing handler
//! cannot hold up accepting on the channel.

use super::PoolShared;
use crate::config::SlotFailurePolicy;
use crate::error::Result;
use crate::handler::HandlerFailure;
use crate::platform::{self, Connection};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, trace};

/// Run one pool slot until cancellation or a slot-ending error.
pub(crate) async fn run_slot(shared: Arc<PoolShared>, slot: usize) {
    let _live = shared.counters.live_slots.track();
    debug!(slot, channel = %shared.channel, "Listener slot started");

    loop {
        let error = match accept_loop(&shared, slot).await {
            Ok(()) => break,
            Err(e) if e.is_shutdown() => break,
            Err(e) => e,
        };

        match shared.failure_policy {
            SlotFailurePolicy::Retire => {
                shared.diagnostics.slot_terminated(slot, &error);
                break;
            }
            SlotFailurePolicy::Restart { delay } => {
                shared.diagnostics.slot_restarting(slot, &error, delay);
                tokio::select! {
                    biased;
                    _ = shared.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!(slot, channel = %shared.channel, "Listener slot exited");
}

/// Accept connections one endpoint at a time.
///
/// Returns `Ok(())` when cancelled while waiting for a peer.
async fn accept_loop(shared: &Arc<PoolShared>, slot: usize) -> Result<()> {
    loop {
        shared.cancel.check()?;
        let endpoint = shared.factory.create().await?;

        let connection = {
            let _listening = shared.counters.listening.track();
            trace!(slot, "Endpoint listening");
            tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => return Ok(()),
                accepted = endpoint.wait_for_connection() => accepted?,
            }
        };

        dispatch(shared, slot, connection);
    }
}

/// Hand a connected endpoint to the handler on its own task.
///
/// The task owns the connection until it is dropped at the end, on every
/// path. Disconnect only follows a successful handler return.
fn dispatch(shared: &Arc<PoolShared>, slot: usize, mut connection: Connection) {
    let guard = shared.counters.track_connection();
    let handler = Arc::clone(&shared.handler);
    let diagnostics = Arc::clone(&shared.diagnostics);
    debug!(slot, connection_id = %guard.id(), "Connection accepted");

    tokio::spawn(async move {
        let id = guard.id();
        let outcome = AssertUnwindSafe(handler.handle(&mut connection))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                if let Err(e) = platform::disconnect(&mut connection).await {
                    debug!(slot, connection_id = %id, error = %e, "Disconnect failed");
                }
                debug!(slot, connection_id = %id, "Connection handled");
            }
            Ok(Err(e)) => {
                diagnostics.handler_failed(slot, id, &HandlerFailure::Error(e));
            }
            Err(payload) => {
                diagnostics.handler_failed(slot, id, &HandlerFailure::from_panic(payload));
            }
        }

        drop(connection);
        drop(guard);
    });
}
