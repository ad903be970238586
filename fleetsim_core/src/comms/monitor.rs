//! Transport event monitor for the directory REQ socket.
//!
//! Tracks connect/disconnect events so a client can expose a cheap
//! `connected` signal without poking the socket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared monitor handle. Clones observe the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorState>,
}

#[derive(Debug, Default)]
struct MonitorState {
    connected: AtomicBool,
    connect_events: AtomicU64,
    disconnect_events: AtomicU64,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful connect event.
    pub fn mark_connected(&self) {
        self.inner.connected.store(true, Ordering::Release);
        self.inner.connect_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disconnect or transport failure.
    pub fn mark_disconnected(&self) {
        if self.inner.connected.swap(false, Ordering::AcqRel) {
            self.inner.disconnect_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// True iff a connect event was observed and no disconnect followed it.
    pub fn connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    pub fn connect_events(&self) -> u64 {
        self.inner.connect_events.load(Ordering::Relaxed)
    }

    pub fn disconnect_events(&self) -> u64 {
        self.inner.disconnect_events.load(Ordering::Relaxed)
    }
}
