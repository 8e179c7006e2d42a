//! Output formatting module
//!
//! Renders run reports for the command line.

mod formatter;

pub use formatter::{OutputFormat, ReportFormatter};
