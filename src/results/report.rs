//! Run report
//!
//! Aggregates root result trees into counts and decides whether a run passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{StepResult, StepState};

/// How a run's success is decided
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPolicy {
    /// Only root units count
    #[default]
    RootsOnly,
    /// Any failed unit at any depth fails the run
    Strict,
}

impl fmt::Display for ReportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportPolicy::RootsOnly => write!(f, "roots-only"),
            ReportPolicy::Strict => write!(f, "strict"),
        }
    }
}

/// Outcome of one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    /// Units at every depth
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub ignored: usize,
    pub duration_ms: u64,
    pub results: Vec<StepResult>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, results: Vec<StepResult>) -> Self {
        let mut passed = 0;
        let mut failed = 0;
        let mut ignored = 0;

        for unit in results.iter().flat_map(StepResult::walk) {
            match unit.state {
                StepState::Passed => passed += 1,
                StepState::Failed => failed += 1,
                StepState::Ignored => ignored += 1,
                StepState::Pending | StepState::Running => {}
            }
        }

        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;

        Self {
            started_at,
            total: passed + failed + ignored,
            passed,
            failed,
            ignored,
            duration_ms,
            results,
        }
    }

    /// Combine several labeled runs into one report. Each root is renamed
    /// `"<label>: <root>"` so roots from different runs stay addressable.
    pub fn merge<L: fmt::Display>(reports: Vec<(L, RunReport)>) -> Self {
        let started_at = reports
            .iter()
            .map(|(_, r)| r.started_at)
            .min()
            .unwrap_or_else(Utc::now);
        let results = reports
            .into_iter()
            .flat_map(|(label, report)| {
                let label = label.to_string();
                report.results.into_iter().map(move |mut root| {
                    root.name = format!("{}: {}", label, root.name);
                    root
                })
            })
            .collect();
        Self::new(started_at, results)
    }

    pub fn root_failures(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn is_success(&self, policy: ReportPolicy) -> bool {
        match policy {
            ReportPolicy::RootsOnly => self.root_failures() == 0,
            ReportPolicy::Strict => self.failed == 0,
        }
    }

    /// Unit by path of names, starting at a root
    pub fn find(&self, path: &[&str]) -> Option<&StepResult> {
        let (root, rest) = path.split_first()?;
        self.results.iter().find(|r| r.name == *root)?.find(rest)
    }

    /// Paths and results of every failed unit, depth-first
    pub fn failures(&self) -> Vec<(String, &StepResult)> {
        let mut out = Vec::new();
        for root in &self.results {
            collect_failures(root, None, &mut out);
        }
        out
    }

    /// Percentage of units that ran and passed
    pub fn pass_rate(&self) -> f64 {
        let ran = self.passed + self.failed;
        if ran == 0 {
            0.0
        } else {
            (self.passed as f64 / ran as f64) * 100.0
        }
    }
}

fn collect_failures<'a>(
    result: &'a StepResult,
    parent: Option<&str>,
    out: &mut Vec<(String, &'a StepResult)>,
) {
    let path = match parent {
        Some(parent) => format!("{parent} > {}", result.name),
        None => result.name.clone(),
    };
    for child in &result.children {
        collect_failures(child, Some(&path), out);
    }
    if result.is_failed() {
        out.push((path, result));
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} ignored ({} total)",
            self.passed, self.failed, self.ignored, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorInfo, ErrorKind};

    fn failure(name: &str) -> StepResult {
        let info = ErrorInfo {
            kind: ErrorKind::Body,
            message: "Fail.".into(),
            leaks: Vec::new(),
        };
        StepResult::failed(name, 1, info, Vec::new())
    }

    fn sample() -> RunReport {
        let database = StepResult::passed(
            "database",
            20,
            vec![
                StepResult::passed("insert user", 2, Vec::new()),
                StepResult::passed(
                    "update and delete",
                    4,
                    vec![failure("update"), StepResult::passed("delete", 1, Vec::new())],
                ),
                StepResult::ignored("copy books"),
            ],
        );
        RunReport::new(Utc::now(), vec![database])
    }

    #[test]
    fn test_counts_every_depth() {
        let report = sample();
        assert_eq!(report.total, 6);
        assert_eq!(report.passed, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.to_string(), "4 passed, 1 failed, 1 ignored (6 total)");
    }

    #[test]
    fn test_policy() {
        let report = sample();
        assert!(report.is_success(ReportPolicy::RootsOnly));
        assert!(!report.is_success(ReportPolicy::Strict));

        let failed_root = RunReport::new(Utc::now(), vec![failure("root")]);
        assert!(!failed_root.is_success(ReportPolicy::RootsOnly));
    }

    #[test]
    fn test_failures_are_listed_by_path() {
        let report = sample();
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "database > update and delete > update");
        assert!(report.find(&["database", "copy books"]).is_some());
        assert!(report.find(&[]).is_none());
    }

    #[test]
    fn test_merge() {
        let failed_root = RunReport::new(Utc::now(), vec![failure("root")]);
        let merged = RunReport::merge(vec![("db", sample()), ("other", failed_root)]);
        assert_eq!(merged.results.len(), 2);
        assert_eq!(merged.total, 7);
        assert_eq!(merged.failed, 2);
        assert!(!merged.is_success(ReportPolicy::RootsOnly));
        assert!(merged.find(&["db: database", "copy books"]).is_some());
        assert!(merged.find(&["database"]).is_none());
    }

    #[test]
    fn test_merge_keeps_same_named_roots_apart() {
        let nested = RunReport::new(
            Utc::now(),
            vec![StepResult::passed("User", 1, vec![failure("create")])],
        );
        let flat = RunReport::new(
            Utc::now(),
            vec![StepResult::passed(
                "User",
                1,
                vec![StepResult::passed("create", 1, Vec::new())],
            )],
        );
        let merged = RunReport::merge(vec![("users-nested", nested), ("users-flat", flat)]);

        assert!(merged.find(&["users-nested: User", "create"]).unwrap().is_failed());
        assert!(!merged.find(&["users-flat: User", "create"]).unwrap().is_failed());

        let failures = merged.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "users-nested: User > create");
    }

    #[test]
    fn test_pass_rate() {
        let report = sample();
        assert!((report.pass_rate() - 80.0).abs() < 1e-9);
        assert_eq!(RunReport::new(Utc::now(), Vec::new()).pass_rate(), 0.0);
    }
}
