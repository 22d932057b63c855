//! Round-robin selection over the endpoint pool

use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::EndpointRecord;

/// Cycles through the endpoint pool in pool order
///
/// The position is advanced with an atomic increment-and-wrap, so concurrent
/// callers never lose an update. Replacing the pool resets the position.
pub struct RoundRobinCursor {
    endpoints: RwLock<Vec<Arc<EndpointRecord>>>,
    index: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(Vec::new()),
            index: AtomicUsize::new(0),
        }
    }

    /// Next endpoint, or `None` while the pool is empty
    pub fn next(&self) -> Option<Arc<EndpointRecord>> {
        let endpoints = self.endpoints.read();

        if endpoints.is_empty() {
            return None;
        }

        let len = endpoints.len();
        let idx = self
            .index
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i)
            % len;

        endpoints.get(idx).cloned()
    }

    /// Install a new pool and restart from its first endpoint
    pub fn replace(&self, endpoints: Vec<EndpointRecord>) {
        let mut guard = self.endpoints.write();
        *guard = endpoints.into_iter().map(Arc::new).collect();
        self.index.store(0, Ordering::Relaxed);
    }

    /// Empty the pool, returning what it held
    pub fn take(&self) -> Vec<Arc<EndpointRecord>> {
        let mut guard = self.endpoints.write();
        self.index.store(0, Ordering::Relaxed);
        std::mem::take(&mut *guard)
    }

    pub fn snapshot(&self) -> Vec<Arc<EndpointRecord>> {
        self.endpoints.read().clone()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}

impl Default for RoundRobinCursor {
    fn default() -> Self {
        Self::new()
    }
}
