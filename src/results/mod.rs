//! Run results
//!
//! Report aggregation, success policy and the collected event stream.

mod events;
mod report;

pub use events::EventLog;
pub use report::{ReportPolicy, RunReport};
