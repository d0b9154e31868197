//! Fixed-size acceptor pool.
//!
//! # Architecture
//!
//! - **Endpoint factory** (`platform`): creates listening endpoints on the channel
//! - **Listener loops** (`listener`): one task per slot, accept → dispatch → re-arm
//! - **Lifecycle** (this module): `Stopped → Running → Disposed`, terminal
//!
//! # Thread Safety
//!
//! The channel name, options and handler are immutable and shared via `Arc`.
//! The cancellation token is the only mutable shared state. Each connection is
//! owned by exactly one task at a time, so connections need no locks.

mod listener;
pub mod tracker;

use crate::cancel::CancellationToken;
use crate::channel::ChannelName;
use crate::config::{PoolConfig, PoolOptions, SlotFailurePolicy};
use crate::diagnostics::{DiagnosticHook, TracingDiagnostics};
use crate::error::{PoolError, Result};
use crate::handler::ConnectionHandler;
use crate::platform::{self, EndpointFactory};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracker::PoolCounters;

/// Lifecycle state of an [`AcceptorPool`].
///
/// `Disposed` is terminal: a disposed pool cannot be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    Stopped = 0,
    Running = 1,
    Disposed = 2,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Stopped,
            1 => PoolState::Running,
            _ => PoolState::Disposed,
        }
    }
}

/// State shared by the pool handle and every slot task.
pub(crate) struct PoolShared {
    pub(crate) channel: ChannelName,
    pub(crate) factory: EndpointFactory,
    pub(crate) handler: Arc<dyn ConnectionHandler>,
    pub(crate) diagnostics: Arc<dyn DiagnosticHook>,
    pub(crate) failure_policy: SlotFailurePolicy,
    pub(crate) cancel: CancellationToken,
    pub(crate) counters: PoolCounters,
}

/// Keeps `pool_size` endpoints listening on a channel and hands each
/// accepted connection to a [`ConnectionHandler`].
///
/// Dropping the pool disposes it.
pub struct AcceptorPool {
    shared: Arc<PoolShared>,
    state: AtomicU8,
    pool_size: usize,
    runtime: Handle,
    slots: Mutex<Vec<JoinHandle<()>>>,
}

impl AcceptorPool {
    /// Create a pool with default diagnostics and `PoolConfig::POOL_SIZE` slots.
    ///
    /// Must be called inside a tokio runtime; slot tasks are spawned on it.
    pub fn new<H: ConnectionHandler>(
        channel: impl AsRef<str>,
        options: PoolOptions,
        handler: Arc<H>,
    ) -> Result<Self> {
        Self::builder(channel).options(options).build(handler)
    }

    pub fn builder(channel: impl AsRef<str>) -> AcceptorPoolBuilder {
        AcceptorPoolBuilder::new(channel)
    }

    /// Begin accepting. Spawns one listener loop per slot.
    ///
    /// Only the first call on a stopped pool has any effect.
    pub fn start(&self) {
        if let Err(current) = self.state.compare_exchange(
            PoolState::Stopped as u8,
            PoolState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            debug!(
                channel = %self.shared.channel,
                state = ?PoolState::from_u8(current),
                "start() ignored"
            );
            return;
        }

        let mut slots = self.lock_slots();
        for slot in 0..self.pool_size {
            let shared = Arc::clone(&self.shared);
            slots.push(self.runtime.spawn(listener::run_slot(shared, slot)));
        }

        info!(
            channel = %self.shared.channel,
            pool_size = self.pool_size,
            transport = platform::transport_name(),
            "Acceptor pool started"
        );
    }

    /// Stop accepting new connections.
    ///
    /// Does not wait for slots to exit and does not touch connections that
    /// were already accepted; their handlers run to completion.
    pub fn dispose(&self) {
        let previous = self.state.swap(PoolState::Disposed as u8, Ordering::SeqCst);
        if previous == PoolState::Disposed as u8 {
            return;
        }

        self.shared.cancel.cancel();
        self.shared.factory.close();
        info!(
            channel = %self.shared.channel,
            in_flight = self.active_connections(),
            "Acceptor pool disposed"
        );
    }

    /// Alias for [`dispose`](Self::dispose).
    pub fn close(&self) {
        self.dispose();
    }

    /// Dispose, then wait for every listener loop to exit.
    ///
    /// In-flight handlers are still not awaited.
    pub async fn shutdown(&self) {
        self.dispose();

        let handles = std::mem::take(&mut *self.lock_slots());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(channel = %self.shared.channel, error = %e, "Listener slot task failed");
            }
        }
    }

    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn channel(&self) -> &ChannelName {
        &self.shared.channel
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Endpoints currently waiting for a peer.
    pub fn listening_endpoints(&self) -> usize {
        self.shared.counters.listening.get()
    }

    /// Connections whose handler has not finished yet.
    pub fn active_connections(&self) -> usize {
        self.shared.counters.active_connections.get()
    }

    /// Listener loops still running. Falls below `pool_size` when a slot retires.
    pub fn live_slots(&self) -> usize {
        self.shared.counters.live_slots.get()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AcceptorPool {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for AcceptorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptorPool")
            .field("channel", &self.shared.channel)
            .field("state", &self.state())
            .field("pool_size", &self.pool_size)
            .field("listening", &self.listening_endpoints())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

/// Builder for [`AcceptorPool`].
pub struct AcceptorPoolBuilder {
    channel: String,
    options: PoolOptions,
    diagnostics: Arc<dyn DiagnosticHook>,
    failure_policy: SlotFailurePolicy,
    pool_size: usize,
}

impl AcceptorPoolBuilder {
    fn new(channel: impl AsRef<str>) -> Self {
        Self {
            channel: channel.as_ref().to_string(),
            options: PoolOptions::default(),
            diagnostics: Arc::new(TracingDiagnostics),
            failure_policy: SlotFailurePolicy::default(),
            pool_size: PoolConfig::POOL_SIZE,
        }
    }

    pub fn options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    pub fn diagnostics<D: DiagnosticHook>(mut self, diagnostics: Arc<D>) -> Self {
        let diagnostics: Arc<dyn DiagnosticHook> = diagnostics;
        self.diagnostics = diagnostics;
        self
    }

    pub fn slot_failure_policy(mut self, policy: SlotFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Validate inputs and create a stopped pool.
    pub fn build<H: ConnectionHandler>(self, handler: Arc<H>) -> Result<AcceptorPool> {
        let channel = ChannelName::new(&self.channel)?;
        if self.pool_size == 0 {
            return Err(PoolError::InvalidOptions {
                message: "pool_size must be at least 1".to_string(),
            });
        }
        let runtime = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        let factory = EndpointFactory::new(channel.clone(), self.options)?;

        let handler: Arc<dyn ConnectionHandler> = handler;
        let shared = PoolShared {
            channel,
            factory,
            handler,
            diagnostics: self.diagnostics,
            failure_policy: self.failure_policy,
            cancel: CancellationToken::new(),
            counters: PoolCounters::default(),
        };

        Ok(AcceptorPool {
            shared: Arc::new(shared),
            state: AtomicU8::new(PoolState::Stopped as u8),
            pool_size: self.pool_size,
            runtime,
            slots: Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Connection;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl ConnectionHandler for NoopHandler {
        async fn handle(&self, _connection: &mut Connection) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_build_requires_runtime() {
        let result = AcceptorPool::new("no-runtime", PoolOptions::default(), Arc::new(NoopHandler));
        assert!(matches!(result, Err(PoolError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_rejects_empty_channel() {
        let result = AcceptorPool::new("", PoolOptions::default(), Arc::new(NoopHandler));
        assert!(matches!(result, Err(PoolError::InvalidChannelName { .. })));
    }

    #[tokio::test]
    async fn test_rejects_zero_pool_size() {
        let result = AcceptorPool::builder("zero")
            .pool_size(0)
            .build(Arc::new(NoopHandler));
        assert!(matches!(result, Err(PoolError::InvalidOptions { .. })));
    }

    #[tokio::test]
    async fn test_new_pool_is_stopped() {
        let pool = AcceptorPool::new("stopped", PoolOptions::default(), Arc::new(NoopHandler))
            .unwrap();
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(pool.pool_size(), PoolConfig::POOL_SIZE);
        assert_eq!(pool.live_slots(), 0);
        assert_eq!(pool.listening_endpoints(), 0);
    }

    #[tokio::test]
    async fn test_dispose_before_start_is_terminal() {
        let pool = AcceptorPool::new("never-started", PoolOptions::default(), Arc::new(NoopHandler))
            .unwrap();
        pool.dispose();
        pool.dispose();
        assert_eq!(pool.state(), PoolState::Disposed);

        pool.start();
        assert_eq!(pool.state(), PoolState::Disposed);
        assert!(pool.lock_slots().is_empty());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [PoolState::Stopped, PoolState::Running, PoolState::Disposed] {
            assert_eq!(PoolState::from_u8(state as u8), state);
        }
    }
}
