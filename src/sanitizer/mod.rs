//! Leak sanitizers
//!
//! Attributes pending async operations, unclosed resources and exit requests to
//! the unit whose execution window produced them.

mod guard;
mod tracker;

pub use guard::{LeakDescriptor, LeakKind, SanitizerGuard, SanitizerSnapshot};
pub use tracker::{OpId, ResourceId, ResourceMonitor, ResourceTracker, TrackedItems};
