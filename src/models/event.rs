//! Lifecycle events emitted by the step engine

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use super::StepState;

/// Channel the engine publishes events on
pub type EventSink = UnboundedSender<StepEvent>;

/// A unit lifecycle transition, keyed by the unit's path (`root > child > leaf`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    Started {
        path: String,
    },
    Ignored {
        path: String,
    },
    Finished {
        path: String,
        state: StepState,
        duration_ms: u64,
    },
}

impl StepEvent {
    pub fn path(&self) -> &str {
        match self {
            StepEvent::Started { path }
            | StepEvent::Ignored { path }
            | StepEvent::Finished { path, .. } => path,
        }
    }
}
