//! Per-unit execution options
//!
//! Sanitizer flags, their inheritance rules, and hook phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Effective sanitizer flags of a running unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerFlags {
    /// Fail when async operations started in the unit are left pending
    pub ops: bool,
    /// Fail when resources opened in the unit are left open
    pub resources: bool,
    /// Fail when the unit requested a process exit
    pub exit: bool,
}

impl SanitizerFlags {
    pub const fn all() -> Self {
        Self {
            ops: true,
            resources: true,
            exit: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            ops: false,
            resources: false,
            exit: false,
        }
    }

    /// Whether any sanitizer is enabled, i.e. a snapshot is required
    pub fn any(&self) -> bool {
        self.ops || self.resources || self.exit
    }
}

impl Default for SanitizerFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for SanitizerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ops={} resources={} exit={}",
            self.ops, self.resources, self.exit
        )
    }
}

/// Options declared on a unit. Unset sanitizer flags inherit from the parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOptions {
    #[serde(default)]
    pub ignore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitize_ops: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitize_resources: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitize_exit: Option<bool>,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore(mut self, ignore: bool) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn sanitize_ops(mut self, enabled: bool) -> Self {
        self.sanitize_ops = Some(enabled);
        self
    }

    pub fn sanitize_resources(mut self, enabled: bool) -> Self {
        self.sanitize_resources = Some(enabled);
        self
    }

    pub fn sanitize_exit(mut self, enabled: bool) -> Self {
        self.sanitize_exit = Some(enabled);
        self
    }

    /// Disable all three sanitizers
    pub fn without_sanitizers(self) -> Self {
        self.sanitize_ops(false)
            .sanitize_resources(false)
            .sanitize_exit(false)
    }

    /// Compute the effective flags given the parent's effective flags
    pub fn resolve(&self, inherited: SanitizerFlags) -> SanitizerFlags {
        SanitizerFlags {
            ops: self.sanitize_ops.unwrap_or(inherited.ops),
            resources: self.sanitize_resources.unwrap_or(inherited.resources),
            exit: self.sanitize_exit.unwrap_or(inherited.exit),
        }
    }
}

/// Hook phase, used when reporting hook failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    BeforeEach,
    AfterEach,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::BeforeEach => write!(f, "before_each"),
            HookPhase::AfterEach => write!(f, "after_each"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_inherit() {
        let options = StepOptions::new();
        assert_eq!(options.resolve(SanitizerFlags::all()), SanitizerFlags::all());
        assert_eq!(
            options.resolve(SanitizerFlags::none()),
            SanitizerFlags::none()
        );
    }

    #[test]
    fn test_explicit_flags_override() {
        let options = StepOptions::new().sanitize_ops(false);
        let flags = options.resolve(SanitizerFlags::all());
        assert!(!flags.ops);
        assert!(flags.resources);
        assert!(flags.exit);

        let flags = StepOptions::new()
            .sanitize_exit(true)
            .resolve(SanitizerFlags::none());
        assert!(flags.any());
        assert!(!flags.ops && !flags.resources);
    }

    #[test]
    fn test_without_sanitizers() {
        let flags = StepOptions::new()
            .without_sanitizers()
            .resolve(SanitizerFlags::all());
        assert!(!flags.any());
    }
}
