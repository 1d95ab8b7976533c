//! Broker counters.
//!
//! Relaxed atomics so the admin surface can read them without touching the
//! event loop's mutable state.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic and gauge counters exposed to the admin surface.
#[derive(Default)]
pub struct BrokerMetrics {
    active_connections: AtomicU64,
    total_connections: AtomicU64,
    total_messages_routed: AtomicU64,
    deliveries_dropped: AtomicU64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_connected(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// One successfully queued fan-out delivery.
    pub fn message_routed(&self) {
        self.total_messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    /// One delivery dropped because the subscriber's write buffer was full.
    pub fn delivery_dropped(&self) {
        self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn total_messages_routed(&self) -> u64 {
        self.total_messages_routed.load(Ordering::Relaxed)
    }

    pub fn deliveries_dropped(&self) -> u64 {
        self.deliveries_dropped.load(Ordering::Relaxed)
    }
}
