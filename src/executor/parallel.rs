//! Concurrent step execution
//!
//! Runs sibling units at the same time. Sanitizer snapshots are process-wide, so
//! units that overlap in time cannot be told apart; concurrency is only allowed
//! when isolation is off for every unit involved.

use anyhow::anyhow;
use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::step::StepDefinition;
use crate::error::StepError;
use crate::models::{ErrorInfo, SanitizerFlags, StepResult};

/// Concurrent runner for sibling units
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConcurrencyCoordinator {
    max_concurrent: usize,
}

impl ConcurrencyCoordinator {
    /// `max_concurrent` of 0 means unbounded
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Reject the batch if any unit that will run keeps a sanitizer enabled
    pub fn ensure_isolation_disabled(
        definitions: &[StepDefinition],
        inherited: SanitizerFlags,
    ) -> Result<(), StepError> {
        for definition in definitions {
            let options = definition.options();
            if options.ignore {
                continue;
            }
            let flags = options.resolve(inherited);
            if flags.any() {
                return Err(StepError::config(format!(
                    "`{}` cannot run concurrently with its siblings while sanitizers are enabled ({flags}); \
                     disable sanitize_ops, sanitize_resources and sanitize_exit for every concurrent step",
                    definition.name()
                )));
            }
        }
        Ok(())
    }

    /// Run all units, returning results in input order
    pub(crate) async fn run(
        &self,
        units: Vec<(String, BoxFuture<'static, StepResult>)>,
    ) -> Vec<StepResult> {
        let permits = match self.max_concurrent {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        let semaphore = Arc::new(Semaphore::new(permits));

        info!(
            "Running {} steps concurrently (max {})",
            units.len(),
            if self.max_concurrent == 0 {
                "unbounded".to_string()
            } else {
                self.max_concurrent.to_string()
            }
        );

        let mut names = Vec::with_capacity(units.len());
        let mut handles = Vec::with_capacity(units.len());

        for (name, unit) in units {
            let semaphore = semaphore.clone();
            names.push(name);
            handles.push(tokio::spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                unit.await
            }));
        }

        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("Concurrent step {} did not complete: {}", name, e);
                    let error = StepError::Body(anyhow!("step task did not complete: {e}"));
                    StepResult::failed(name, 0, ErrorInfo::from(&error), Vec::new())
                }
            })
            .collect()
    }
}

impl Default for ConcurrencyCoordinator {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_coordinator_creation() {
        assert_eq!(ConcurrencyCoordinator::new(8).max_concurrent(), 8);
        assert_eq!(ConcurrencyCoordinator::default().max_concurrent(), 0);
    }

    #[test]
    fn test_isolation_check() {
        let ok = vec![
            StepDefinition::new("case 1", |_t| async { Ok(()) }).without_sanitizers(),
            StepDefinition::new("case 2", |_t| async { Ok(()) }).ignore(true),
        ];
        assert!(
            ConcurrencyCoordinator::ensure_isolation_disabled(&ok, SanitizerFlags::all()).is_ok()
        );

        let bad = vec![StepDefinition::new("case 3", |_t| async { Ok(()) }).sanitize_ops(false)];
        let err =
            ConcurrencyCoordinator::ensure_isolation_disabled(&bad, SanitizerFlags::all()).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("case 3"));

        // inherited flags count
        let inherited = vec![StepDefinition::new("case 4", |_t| async { Ok(()) })];
        assert!(
            ConcurrencyCoordinator::ensure_isolation_disabled(&inherited, SanitizerFlags::none())
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let units = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                let unit = async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    StepResult::passed(format!("case {i}"), 10, Vec::new())
                }
                .boxed();
                (format!("case {i}"), unit)
            })
            .collect();

        let results = ConcurrencyCoordinator::new(2).run(units).await;
        assert_eq!(results.len(), 6);
        assert_eq!(results[0].name, "case 0");
        assert_eq!(results[5].name, "case 5");
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
