//! Connection IDs and live counters for the pool.
//!
//! Every counter is driven by an RAII guard so it stays correct on every exit
//! path of a listener loop or dispatch unit, including panics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Relaxed ordering is enough: IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A shared count that only moves through guards.
#[derive(Debug, Clone, Default)]
pub(crate) struct Gauge(Arc<AtomicUsize>);

impl Gauge {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn track(&self) -> GaugeGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        GaugeGuard(Arc::clone(&self.0))
    }
}

/// Decrements its gauge when dropped.
#[derive(Debug)]
pub(crate) struct GaugeGuard(Arc<AtomicUsize>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counters shared by the pool handle, its slots and its dispatch units.
#[derive(Debug, Clone, Default)]
pub(crate) struct PoolCounters {
    /// Endpoints currently waiting for a peer.
    pub(crate) listening: Gauge,
    /// Dispatch units currently running a handler.
    pub(crate) active_connections: Gauge,
    /// Listener loops that have not exited.
    pub(crate) live_slots: Gauge,
}

impl PoolCounters {
    /// Register a newly accepted connection.
    pub(crate) fn track_connection(&self) -> ConnectionGuard {
        ConnectionGuard {
            _active: self.active_connections.track(),
            id: ConnectionId::next(),
        }
    }
}

/// Held by a dispatch unit for the lifetime of its connection.
#[derive(Debug)]
pub(crate) struct ConnectionGuard {
    _active: GaugeGuard,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("conn-"));
    }

    #[test]
    fn test_gauge_follows_guards() {
        let gauge = Gauge::default();
        let g1 = gauge.track();
        let g2 = gauge.track();
        assert_eq!(gauge.get(), 2);

        drop(g1);
        assert_eq!(gauge.get(), 1);
        drop(g2);
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_connection_guard_counts_active() {
        let counters = PoolCounters::default();
        let guard = counters.track_connection();
        assert_eq!(counters.active_connections.get(), 1);
        drop(guard);
        assert_eq!(counters.active_connections.get(), 0);
    }
}
