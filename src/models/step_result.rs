//! Step result models
//!
//! Defines execution states, failure records and the result tree of a run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StepError;
use crate::sanitizer::LeakDescriptor;

/// Lifecycle state of a unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Passed,
    Failed,
    Ignored,
}

impl StepState {
    pub fn symbol(&self) -> &'static str {
        match self {
            StepState::Pending => "…",
            StepState::Running => "▶",
            StepState::Passed => "✓",
            StepState::Failed => "✗",
            StepState::Ignored => "○",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Passed | StepState::Failed | StepState::Ignored
        )
    }

    /// Whether the unit's body was actually scheduled
    pub fn ran(&self) -> bool {
        !matches!(self, StepState::Ignored)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepState::Pending => write!(f, "PENDING"),
            StepState::Running => write!(f, "RUNNING"),
            StepState::Passed => write!(f, "PASS"),
            StepState::Failed => write!(f, "FAIL"),
            StepState::Ignored => write!(f, "IGNORED"),
        }
    }
}

/// Failure category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Body,
    Hook,
    Leak,
    Configuration,
}

/// Serializable failure record attached to a failed result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaks: Vec<LeakDescriptor>,
}

impl From<&StepError> for ErrorInfo {
    fn from(error: &StepError) -> Self {
        let kind = match error {
            StepError::Body(_) | StepError::PendingSteps { .. } => ErrorKind::Body,
            StepError::Hook { .. } => ErrorKind::Hook,
            StepError::Leak { .. } => ErrorKind::Leak,
            StepError::Config(_) => ErrorKind::Configuration,
            StepError::Failed { result } => {
                if let Some(info) = &result.error {
                    return info.clone();
                }
                ErrorKind::Body
            }
        };
        let leaks = match error {
            StepError::Leak { leaks } => leaks.clone(),
            _ => Vec::new(),
        };

        Self {
            kind,
            message: error.to_string(),
            leaks,
        }
    }
}

/// Result of a single unit, including the results of its child steps
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub state: StepState,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepResult>,
}

impl StepResult {
    pub fn passed(name: impl Into<String>, duration_ms: u64, children: Vec<StepResult>) -> Self {
        Self {
            name: name.into(),
            state: StepState::Passed,
            duration_ms,
            error: None,
            children,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        duration_ms: u64,
        error: ErrorInfo,
        children: Vec<StepResult>,
    ) -> Self {
        Self {
            name: name.into(),
            state: StepState::Failed,
            duration_ms,
            error: Some(error),
            children,
        }
    }

    pub fn ignored(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: StepState::Ignored,
            duration_ms: 0,
            error: None,
            children: Vec::new(),
        }
    }

    /// `false` only when the unit was ignored
    pub fn ran(&self) -> bool {
        self.state.ran()
    }

    pub fn is_passed(&self) -> bool {
        self.state == StepState::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.state == StepState::Failed
    }

    /// Direct child by name
    pub fn child(&self, name: &str) -> Option<&StepResult> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Descendant by relative path of names
    pub fn find(&self, path: &[&str]) -> Option<&StepResult> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.child(head)?.find(rest),
        }
    }

    /// This result and all of its descendants, depth-first
    pub fn walk(&self) -> Vec<&StepResult> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    /// Re-raise a failure as an error, for callers that want to propagate it
    pub fn into_result(self) -> Result<StepResult, StepError> {
        if self.is_failed() {
            Err(StepError::Failed {
                result: Box::new(self),
            })
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.state.symbol(),
            self.name,
            self.duration_ms
        )?;
        if let Some(error) = &self.error {
            write!(f, " - {}", error.message)?;
        }
        Ok(())
    }
}
