//! Test runner
//!
//! Top-level entry point. Owns the root scopes (one sanitizer guard per root),
//! the optional event sink and the runner-level configuration.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::parallel::ConcurrencyCoordinator;
use super::step::{execute_unit, reserve_names, validate_name, HookPlan, Scope, StepDefinition};
use crate::bdd::{self, SuiteTree};
use crate::config::AppConfig;
use crate::error::StepError;
use crate::models::{EventSink, SanitizerFlags, StepResult};
use crate::results::{ReportPolicy, RunReport};
use crate::sanitizer::{ResourceMonitor, ResourceTracker};

/// Runner for root units and suite trees
pub struct TestRunner {
    sanitizers: SanitizerFlags,
    max_concurrent: usize,
    policy: ReportPolicy,
    monitor: Arc<dyn ResourceMonitor>,
    events: Option<EventSink>,
}

impl TestRunner {
    /// Create a runner from configuration. Uses a fresh [`ResourceTracker`] until
    /// another monitor is supplied.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            sanitizers: config.sanitizers,
            max_concurrent: config.max_concurrent,
            policy: config.report_policy(),
            monitor: Arc::new(ResourceTracker::new()),
            events: None,
        }
    }

    /// Observe resources through `monitor`
    pub fn with_monitor(mut self, monitor: Arc<dyn ResourceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Send lifecycle events to `sink`
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn policy(&self) -> ReportPolicy {
        self.policy
    }

    pub fn monitor(&self) -> Arc<dyn ResourceMonitor> {
        self.monitor.clone()
    }

    pub(crate) fn root_scope(&self) -> Scope {
        Scope::root(
            self.monitor.clone(),
            self.sanitizers,
            self.events.clone(),
            self.max_concurrent,
        )
    }

    /// Run one root unit. A failed root is raised as [`StepError::Failed`] carrying
    /// the whole result tree.
    pub async fn run_test(&self, definition: StepDefinition) -> Result<StepResult, StepError> {
        validate_name(definition.name())?;
        let result = execute_unit(self.root_scope(), definition, HookPlan::default()).await;
        info!("  {}", result);
        result.into_result()
    }

    /// Run root units one after another
    pub async fn run_all(&self, definitions: Vec<StepDefinition>) -> Result<RunReport, StepError> {
        Self::reserve_roots(&definitions)?;

        info!("Running {} tests", definitions.len());
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let result = execute_unit(self.root_scope(), definition, HookPlan::default()).await;
            info!("  {}", result);
            results.push(result);
        }

        Ok(self.report(RunReport::new(started_at, results)))
    }

    /// Run root units concurrently. All of them must have sanitizers disabled.
    pub async fn run_concurrent(
        &self,
        definitions: Vec<StepDefinition>,
    ) -> Result<RunReport, StepError> {
        ConcurrencyCoordinator::ensure_isolation_disabled(&definitions, self.sanitizers)?;
        Self::reserve_roots(&definitions)?;

        let started_at = Utc::now();
        let units = definitions
            .into_iter()
            .map(|definition| {
                let name = definition.name().to_string();
                let unit = execute_unit(self.root_scope(), definition, HookPlan::default());
                (name, unit)
            })
            .collect();

        let results = ConcurrencyCoordinator::new(self.max_concurrent)
            .run(units)
            .await;
        Ok(self.report(RunReport::new(started_at, results)))
    }

    /// Run every root suite of `tree` depth-first
    pub async fn run_suites<F>(&self, tree: SuiteTree<F>) -> RunReport
    where
        F: Default + Send + 'static,
    {
        info!(
            "Running {} suites ({} tests)",
            tree.roots().len(),
            tree.test_count()
        );
        let started_at = Utc::now();
        let results = bdd::run_tree(self, Arc::new(tree)).await;
        self.report(RunReport::new(started_at, results))
    }

    fn reserve_roots(definitions: &[StepDefinition]) -> Result<(), StepError> {
        let names: Vec<&str> = definitions.iter().map(StepDefinition::name).collect();
        reserve_names(&names, &mut HashSet::new(), None)
    }

    fn report(&self, report: RunReport) -> RunReport {
        info!(
            "Run completed in {}ms - {} ({})",
            report.duration_ms,
            report,
            if report.is_success(self.policy) {
                "ok"
            } else {
                "failed"
            }
        );
        report
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new(&AppConfig::default())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::models::{ErrorKind, StepEvent, StepState};
    use crate::results::EventLog;

    #[test]
    fn test_runner_creation() {
        let config = AppConfig {
            fail_on_nested_failure: true,
            ..AppConfig::default()
        };
        let runner = TestRunner::new(&config);
        assert_eq!(runner.policy(), ReportPolicy::Strict);
        assert_eq!(TestRunner::default().policy(), ReportPolicy::RootsOnly);
    }

    #[tokio::test]
    async fn test_failed_root_is_raised() {
        let runner = TestRunner::default();
        let err = runner
            .run_test(StepDefinition::new("broken", |_t| async {
                anyhow::bail!("boom")
            }))
            .await
            .unwrap_err();

        match err {
            StepError::Failed { result } => {
                assert_eq!(result.name, "broken");
                assert_eq!(result.error.unwrap().message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ignored_root_is_not_an_error() {
        let runner = TestRunner::default();
        let result = runner
            .run_test(StepDefinition::new("skipped", |_t| async { Ok(()) }).ignore(true))
            .await
            .unwrap();
        assert_eq!(result.state, StepState::Ignored);
    }

    #[tokio::test]
    async fn test_run_all_counts_nested_units() {
        let runner = TestRunner::default();
        let report = runner
            .run_all(vec![
                StepDefinition::new("first", |t| async move {
                    t.step("fails", |_t| async { anyhow::bail!("nope") }).await?;
                    Ok(())
                }),
                StepDefinition::new("second", |_t| async { Ok(()) }).ignore(true),
            ])
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.ignored, 1);
        assert!(report.is_success(ReportPolicy::RootsOnly));
        assert!(!report.is_success(ReportPolicy::Strict));
    }

    #[tokio::test]
    async fn test_duplicate_root_names_rejected_before_running() {
        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let runner = TestRunner::default().with_events(sender);
        let err = runner
            .run_all(vec![
                StepDefinition::new("same", |_t| async { Ok(()) }),
                StepDefinition::new("same", |_t| async { Ok(()) }),
            ])
            .await
            .unwrap_err();

        assert!(err.is_config());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_concurrent_requires_disabled_sanitizers() {
        let runner = TestRunner::default();
        let err = runner
            .run_concurrent(vec![StepDefinition::new("root", |_t| async { Ok(()) })])
            .await
            .unwrap_err();
        assert!(err.is_config());

        let report = runner
            .run_concurrent(vec![
                StepDefinition::new("a", |_t| async { Ok(()) }).without_sanitizers(),
                StepDefinition::new("b", |_t| async { Ok(()) }).without_sanitizers(),
            ])
            .await
            .unwrap();
        assert_eq!(report.passed, 2);
    }

    #[tokio::test]
    async fn test_child_leak_is_attributed_to_child_only() {
        let tracker = Arc::new(ResourceTracker::new());
        let runner = TestRunner::default().with_monitor(tracker.clone());
        let leaking = tracker.clone();

        let result = runner
            .run_test(StepDefinition::new("parent", move |t| async move {
                t.step("child", move |_t| async move {
                    leaking.open_resource("file");
                    Ok(())
                })
                .await?;
                Ok(())
            }))
            .await
            .unwrap();

        assert!(result.is_passed());
        let child = result.child("child").unwrap();
        assert_eq!(child.error.as_ref().unwrap().kind, ErrorKind::Leak);
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let runner = TestRunner::default().with_events(sender);
        runner
            .run_test(StepDefinition::new("outer", |t| async move {
                t.step("inner", |_t| async { Ok(()) }).await?;
                Ok(())
            }))
            .await
            .unwrap();
        drop(runner);

        let log = EventLog::collect(receiver);
        assert_eq!(log.started(), vec!["outer", "outer > inner"]);
        assert_eq!(log.finished(), vec!["outer > inner", "outer"]);
        assert!(matches!(
            log.events().last(),
            Some(StepEvent::Finished {
                state: StepState::Passed,
                ..
            })
        ));
    }
}
