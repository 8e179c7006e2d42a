//! Data models for step execution
//!
//! Options, results and events shared by the engine, the BDD layer and the reporter.

mod event;
mod options;
mod step_result;

pub use event::{EventSink, StepEvent};
pub use options::{HookPhase, SanitizerFlags, StepOptions};
pub use step_result::{ErrorInfo, ErrorKind, StepResult, StepState};
