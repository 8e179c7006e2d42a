//! Error types for the step execution core.

use thiserror::Error;

use crate::models::{HookPhase, StepResult};
use crate::sanitizer::LeakDescriptor;

/// Errors produced while executing a unit.
#[derive(Error, Debug)]
pub enum StepError {
    /// The unit's own body returned an error or panicked
    #[error("{0:#}")]
    Body(anyhow::Error),

    /// A before_each or after_each hook failed
    #[error("{phase} hook failed: {error:#}")]
    Hook {
        phase: HookPhase,
        error: anyhow::Error,
    },

    /// The sanitizer found state left behind by the unit
    #[error("leak detected: {}", describe_leaks(.leaks))]
    Leak { leaks: Vec<LeakDescriptor> },

    /// The body returned while child steps it started were still running
    #[error("{count} step(s) were still running when the body returned; await every step before returning")]
    PendingSteps { count: usize },

    /// Invalid use of the API, raised before any body runs
    #[error("configuration error: {0}")]
    Config(String),

    /// A unit failure re-raised to the caller that awaited it
    #[error("step `{}` failed: {}", .result.name, failure_message(.result))]
    Failed { result: Box<StepResult> },
}

impl StepError {
    pub fn config(message: impl Into<String>) -> Self {
        StepError::Config(message.into())
    }

    pub fn hook(phase: HookPhase, error: anyhow::Error) -> Self {
        StepError::Hook { phase, error }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, StepError::Config(_))
    }
}

fn describe_leaks(leaks: &[LeakDescriptor]) -> String {
    leaks
        .iter()
        .map(|l| l.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn failure_message(result: &StepResult) -> &str {
    result
        .error
        .as_ref()
        .map(|e| e.message.as_str())
        .unwrap_or("unknown failure")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::LeakKind;

    #[test]
    fn test_hook_error_display() {
        let err = StepError::hook(HookPhase::AfterEach, anyhow::anyhow!("store not empty"));
        assert_eq!(err.to_string(), "after_each hook failed: store not empty");
    }

    #[test]
    fn test_leak_error_display() {
        let err = StepError::Leak {
            leaks: vec![LeakDescriptor::new(LeakKind::Resources, vec!["file".into()])],
        };
        assert!(err.to_string().starts_with("leak detected: 1 resource"));
    }

    #[test]
    fn test_body_error_keeps_context_chain() {
        let source = anyhow::anyhow!("connection reset").context("insert failed");
        let err = StepError::Body(source);
        assert_eq!(err.to_string(), "insert failed: connection reset");
    }
}
