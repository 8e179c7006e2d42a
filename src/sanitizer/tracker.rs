//! Resource accounting
//!
//! The step engine only sees the [`ResourceMonitor`] capability. [`ResourceTracker`]
//! is the in-process implementation: code under test registers async operations,
//! resource handles and exit requests with it.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Live items of one kind, keyed by id, valued by a human-readable label
pub type TrackedItems = BTreeMap<u64, String>;

/// Capability queried by the sanitizer guard to fingerprint resource state
pub trait ResourceMonitor: Send + Sync {
    /// Async operations started but not yet settled
    fn pending_ops(&self) -> TrackedItems;

    /// Resource handles opened but not yet closed
    fn open_resources(&self) -> TrackedItems;

    /// Intercepted process exit requests
    fn exit_requests(&self) -> TrackedItems;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

#[derive(Debug, Default)]
struct TrackerState {
    ops: TrackedItems,
    resources: TrackedItems,
    exits: TrackedItems,
}

/// In-memory resource ledger
#[derive(Debug, Default)]
pub struct ResourceTracker {
    next_id: AtomicU64,
    state: Mutex<TrackerState>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn start_op(&self, label: impl Into<String>) -> OpId {
        let id = self.next_id();
        self.state.lock().ops.insert(id, label.into());
        OpId(id)
    }

    /// Returns `false` if the op was unknown or already settled
    pub fn settle_op(&self, op: OpId) -> bool {
        self.state.lock().ops.remove(&op.0).is_some()
    }

    /// Run `fut` as a tracked op. The op stays pending if `fut` is dropped early.
    pub async fn track_op<F>(&self, label: impl Into<String>, fut: F) -> F::Output
    where
        F: Future,
    {
        let op = self.start_op(label);
        let output = fut.await;
        self.settle_op(op);
        output
    }

    pub fn open_resource(&self, label: impl Into<String>) -> ResourceId {
        let id = self.next_id();
        let label = label.into();
        debug!("Opened resource {} ({})", id, label);
        self.state.lock().resources.insert(id, label);
        ResourceId(id)
    }

    pub fn close_resource(&self, resource: ResourceId) -> bool {
        let closed = self.state.lock().resources.remove(&resource.0).is_some();
        if !closed {
            warn!("Resource {} closed twice or never opened", resource.0);
        }
        closed
    }

    /// Record an exit request. The process keeps running.
    pub fn request_exit(&self, code: i32) {
        let id = self.next_id();
        warn!("Intercepted process exit request with code {}", code);
        self.state.lock().exits.insert(id, format!("exit({code})"));
    }

    pub fn pending_op_count(&self) -> usize {
        self.state.lock().ops.len()
    }

    pub fn open_resource_count(&self) -> usize {
        self.state.lock().resources.len()
    }
}

impl ResourceMonitor for ResourceTracker {
    fn pending_ops(&self) -> TrackedItems {
        self.state.lock().ops.clone()
    }

    fn open_resources(&self) -> TrackedItems {
        self.state.lock().resources.clone()
    }

    fn exit_requests(&self) -> TrackedItems {
        self.state.lock().exits.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_lifecycle() {
        let tracker = ResourceTracker::new();
        let file = tracker.open_resource("file");
        assert_eq!(tracker.open_resource_count(), 1);
        assert!(tracker.close_resource(file));
        assert!(!tracker.close_resource(file));
        assert_eq!(tracker.open_resource_count(), 0);
    }

    #[tokio::test]
    async fn test_track_op_settles() {
        let tracker = ResourceTracker::new();
        let value = tracker
            .track_op("query", async {
                tokio::task::yield_now().await;
                7
            })
            .await;
        assert_eq!(value, 7);
        assert_eq!(tracker.pending_op_count(), 0);
    }

    #[test]
    fn test_exit_request_is_recorded() {
        let tracker = ResourceTracker::new();
        tracker.request_exit(3);
        let exits = tracker.exit_requests();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits.values().next().map(String::as_str), Some("exit(3)"));
    }
}
