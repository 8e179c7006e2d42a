//! Output formatters for run reports
//!
//! Provides JSON and summary output formats.

use anyhow::{Context, Result};
use std::io::Write;

use crate::results::{ReportPolicy, RunReport};

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    #[default]
    JsonPretty,
    Summary,
}

impl OutputFormat {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" | "pretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }

    pub fn all() -> [OutputFormat; 3] {
        [
            OutputFormat::Json,
            OutputFormat::JsonPretty,
            OutputFormat::Summary,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::JsonPretty => "json-pretty",
            OutputFormat::Summary => "summary",
        }
    }
}

/// Report formatter
pub struct ReportFormatter {
    format: OutputFormat,
    policy: ReportPolicy,
}

impl ReportFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            policy: ReportPolicy::default(),
        }
    }

    /// Policy used for the verdict in summary output
    pub fn with_policy(mut self, policy: ReportPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn format(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string(report).context("Failed to serialize report")
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(report).context("Failed to serialize report")
            }
            OutputFormat::Summary => Ok(self.format_summary(report)),
        }
    }

    fn format_summary(&self, report: &RunReport) -> String {
        let verdict = if report.is_success(self.policy) {
            "ok"
        } else {
            "FAILED"
        };
        let mut output = format!(
            "{} ({:.1}% of run units passed, {}ms) - {} [{}]",
            report,
            report.pass_rate(),
            report.duration_ms,
            verdict,
            self.policy
        );
        for (path, result) in report.failures() {
            let message = result
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or_default();
            output.push_str(&format!("\n  ✗ {path}: {message}"));
        }
        output
    }

    /// Write the formatted report followed by a newline
    pub fn write<W: Write>(&self, writer: &mut W, report: &RunReport) -> Result<()> {
        writeln!(writer, "{}", self.format(report)?).context("Failed to write report")?;
        Ok(())
    }
}
