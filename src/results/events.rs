//! Event log
//!
//! Collects the lifecycle events a run emitted.

use tokio::sync::mpsc::UnboundedReceiver;

use crate::models::StepEvent;

/// Events received from the engine, in emission order
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<StepEvent>,
}

impl EventLog {
    /// Drain whatever is buffered in `receiver` without waiting
    pub fn collect(mut receiver: UnboundedReceiver<StepEvent>) -> Self {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        Self { events }
    }

    pub fn events(&self) -> &[StepEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn started(&self) -> Vec<&str> {
        self.paths(|e| matches!(e, StepEvent::Started { .. }))
    }

    pub fn ignored(&self) -> Vec<&str> {
        self.paths(|e| matches!(e, StepEvent::Ignored { .. }))
    }

    pub fn finished(&self) -> Vec<&str> {
        self.paths(|e| matches!(e, StepEvent::Finished { .. }))
    }

    fn paths(&self, keep: impl Fn(&StepEvent) -> bool) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| keep(e))
            .map(StepEvent::path)
            .collect()
    }

    /// Serialize as JSON lines
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
