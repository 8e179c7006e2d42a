//! Sanitizer guard
//!
//! Snapshots resource state before a unit runs and diffs it afterwards. One guard
//! is shared by every unit of a root tree; it remembers which leaked items were
//! already attributed so an ancestor is never blamed for a descendant's leak.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::tracker::{ResourceMonitor, TrackedItems};
use crate::models::SanitizerFlags;

/// Kind of state a unit left behind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakKind {
    Ops,
    Resources,
    Exit,
}

impl LeakKind {
    pub fn all() -> [LeakKind; 3] {
        [LeakKind::Ops, LeakKind::Resources, LeakKind::Exit]
    }

    fn enabled(self, flags: SanitizerFlags) -> bool {
        match self {
            LeakKind::Ops => flags.ops,
            LeakKind::Resources => flags.resources,
            LeakKind::Exit => flags.exit,
        }
    }

    fn message(self, delta: usize) -> String {
        match self {
            LeakKind::Ops => format!(
                "{delta} async operation(s) started in this step did not complete before it finished (+{delta} pending)"
            ),
            LeakKind::Resources => format!(
                "{delta} resource(s) opened in this step were not closed before it finished (+{delta} open)"
            ),
            LeakKind::Exit => {
                format!("process exit was requested {delta} time(s) in this step")
            }
        }
    }
}

impl fmt::Display for LeakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakKind::Ops => write!(f, "op leak"),
            LeakKind::Resources => write!(f, "resource leak"),
            LeakKind::Exit => write!(f, "exit leak"),
        }
    }
}

/// One leaked kind with its count delta and the labels of the leaked items
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakDescriptor {
    pub kind: LeakKind,
    pub delta: usize,
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl LeakDescriptor {
    pub fn new(kind: LeakKind, details: Vec<String>) -> Self {
        let delta = details.len();
        Self {
            kind,
            delta,
            message: kind.message(delta),
            details,
        }
    }
}

/// Resource fingerprint at one point in time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SanitizerSnapshot {
    ops: TrackedItems,
    resources: TrackedItems,
    exits: TrackedItems,
}

impl SanitizerSnapshot {
    fn items(&self, kind: LeakKind) -> &TrackedItems {
        match kind {
            LeakKind::Ops => &self.ops,
            LeakKind::Resources => &self.resources,
            LeakKind::Exit => &self.exits,
        }
    }

    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn open_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn exit_requests(&self) -> usize {
        self.exits.len()
    }
}

/// Snapshot/diff guard for one root unit tree
pub struct SanitizerGuard {
    monitor: Arc<dyn ResourceMonitor>,
    attributed: Mutex<HashSet<(LeakKind, u64)>>,
}

impl SanitizerGuard {
    pub fn new(monitor: Arc<dyn ResourceMonitor>) -> Self {
        Self {
            monitor,
            attributed: Mutex::new(HashSet::new()),
        }
    }

    pub fn monitor(&self) -> &Arc<dyn ResourceMonitor> {
        &self.monitor
    }

    pub fn snapshot(&self) -> SanitizerSnapshot {
        SanitizerSnapshot {
            ops: self.monitor.pending_ops(),
            resources: self.monitor.open_resources(),
            exits: self.monitor.exit_requests(),
        }
    }

    /// Items live in `after` but not in `before`, restricted to the kinds enabled in
    /// `flags` and to items no nested unit has claimed yet. Returned items are
    /// claimed by the caller.
    pub fn diff(
        &self,
        before: &SanitizerSnapshot,
        after: &SanitizerSnapshot,
        flags: SanitizerFlags,
    ) -> Vec<LeakDescriptor> {
        let mut attributed = self.attributed.lock();
        let mut leaks = Vec::new();

        for kind in LeakKind::all() {
            if !kind.enabled(flags) {
                continue;
            }
            let previous = before.items(kind);
            let leaked: Vec<(u64, String)> = after
                .items(kind)
                .iter()
                .filter(|(id, _)| !previous.contains_key(*id))
                .filter(|(id, _)| !attributed.contains(&(kind, **id)))
                .map(|(id, label)| (*id, label.clone()))
                .collect();

            if leaked.is_empty() {
                continue;
            }
            debug!("Sanitizer found {} new {}(s)", leaked.len(), kind);
            let mut details = Vec::with_capacity(leaked.len());
            for (id, label) in leaked {
                attributed.insert((kind, id));
                details.push(label);
            }
            leaks.push(LeakDescriptor::new(kind, details));
        }

        leaks
    }
}
