//! Diagnostic hook for failures the pool absorbs.
//!
//! Nothing the pool does after `start()` returns an error to the caller.
//! Handler failures and slot-ending errors are reported here instead.

use crate::error::PoolError;
use crate::handler::HandlerFailure;
use crate::pool::tracker::ConnectionId;
use std::time::Duration;
use tracing::{error, warn};

/// Observer for absorbed failures.
///
/// Called from pool tasks; implementations must not block.
pub trait DiagnosticHook: Send + Sync + 'static {
    /// A handler returned an error or panicked. The slot keeps accepting.
    fn handler_failed(&self, slot: usize, connection: ConnectionId, failure: &HandlerFailure);

    /// A slot hit an unexpected error and stopped accepting for good.
    fn slot_terminated(&self, slot: usize, error: &PoolError);

    /// A slot hit an unexpected error and will re-enter its loop after `delay`.
    fn slot_restarting(&self, slot: usize, error: &PoolError, delay: Duration) {
        warn!(
            slot,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Listener slot failed, restarting"
        );
    }
}

/// Default hook: structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticHook for TracingDiagnostics {
    fn handler_failed(&self, slot: usize, connection: ConnectionId, failure: &HandlerFailure) {
        warn!(
            slot,
            connection_id = %connection,
            panic = failure.is_panic(),
            "Connection handler failed: {}",
            failure
        );
    }

    fn slot_terminated(&self, slot: usize, error: &PoolError) {
        error!(
            slot,
            error = %error,
            "Listener slot terminated; pool capacity reduced"
        );
    }
}
