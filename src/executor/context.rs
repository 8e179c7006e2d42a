//! Test context
//!
//! Handle given to every body. Starts child steps bound to the unit that owns it
//! and keeps their results in the order they finished.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::parallel::ConcurrencyCoordinator;
use super::step::{execute_unit, reserve_names, HookPlan, Scope, StepDefinition};
use crate::error::StepError;
use crate::models::{SanitizerFlags, StepResult};
use crate::sanitizer::ResourceMonitor;

struct ContextInner {
    name: String,
    path: String,
    flags: SanitizerFlags,
    scope: Scope,
    running: AtomicBool,
    active: AtomicUsize,
    /// In-flight children that run with at least one sanitizer enabled
    sanitized: AtomicUsize,
    children: Mutex<Vec<StepResult>>,
    names: Mutex<HashSet<String>>,
}

/// Context of a running unit
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<ContextInner>,
}

impl TestContext {
    pub(crate) fn new(name: String, path: String, flags: SanitizerFlags, parent: &Scope) -> Self {
        let scope = parent.nested(path.clone(), flags);
        Self {
            inner: Arc::new(ContextInner {
                name,
                path,
                flags,
                scope,
                running: AtomicBool::new(true),
                active: AtomicUsize::new(0),
                sanitized: AtomicUsize::new(0),
                children: Mutex::new(Vec::new()),
                names: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Names from the root down to this unit, joined with ` > `
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Sanitizer settings in effect for this unit, inherited by its steps
    pub fn sanitizers(&self) -> SanitizerFlags {
        self.inner.flags
    }

    /// `false` once the unit's body has returned
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Resource monitor the sanitizers of this run observe
    pub fn monitor(&self) -> Arc<dyn ResourceMonitor> {
        self.inner.scope.guard.monitor().clone()
    }

    /// Results of the child steps finished so far
    pub fn children(&self) -> Vec<StepResult> {
        self.inner.children.lock().clone()
    }

    /// Run a child step. Resolves to `true` if it ran, `false` if it was ignored.
    ///
    /// A failing child does not make this call fail; the failure is recorded in the
    /// child's result. `Err` means the step could not be started at all.
    pub async fn step<B, Fut>(&self, name: impl Into<String>, body: B) -> Result<bool, StepError>
    where
        B: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.step_with(StepDefinition::new(name, body)).await
    }

    /// Configuration form of [`TestContext::step`]
    pub async fn step_with(&self, definition: StepDefinition) -> Result<bool, StepError> {
        Ok(self.run_step(definition).await?.ran())
    }

    /// Run a child step and return its full result
    pub async fn run_step(&self, definition: StepDefinition) -> Result<StepResult, StepError> {
        self.run_hooked(definition, HookPlan::default()).await
    }

    pub(crate) async fn run_hooked(
        &self,
        definition: StepDefinition,
        hooks: HookPlan,
    ) -> Result<StepResult, StepError> {
        let _active = self.admit(&[&definition])?;

        let result = execute_unit(self.inner.scope.clone(), definition, hooks).await;
        self.record(&result);
        Ok(result)
    }

    /// Run sibling steps concurrently.
    ///
    /// Every non-ignored step must run with all sanitizers disabled, otherwise the
    /// whole batch is rejected before anything starts. Results come back in the
    /// order the definitions were given.
    pub async fn steps_concurrent(
        &self,
        definitions: Vec<StepDefinition>,
    ) -> Result<Vec<StepResult>, StepError> {
        ConcurrencyCoordinator::ensure_isolation_disabled(&definitions, self.inner.flags)?;
        let admitted = {
            let batch: Vec<&StepDefinition> = definitions.iter().collect();
            self.admit(&batch)?
        };

        let units = definitions
            .into_iter()
            .zip(admitted)
            .map(|(definition, active)| {
                let name = definition.name().to_string();
                let unit = execute_unit(self.inner.scope.clone(), definition, HookPlan::default());
                let task = async move {
                    let _active = active;
                    unit.await
                }
                .boxed();
                (name, task)
            })
            .collect();

        let results = ConcurrencyCoordinator::new(self.inner.scope.max_concurrent)
            .run(units)
            .await;
        for result in &results {
            self.record(result);
        }
        Ok(results)
    }

    /// Check the preconditions of starting `definitions` now and count them as in
    /// flight. Steps may only overlap their siblings when none of the overlapping
    /// steps has a sanitizer enabled.
    fn admit(&self, definitions: &[&StepDefinition]) -> Result<Vec<ActiveStep>, StepError> {
        let names: Vec<&str> = definitions.iter().map(|d| d.name()).collect();
        let mut taken = self.inner.names.lock();

        if !self.is_running() {
            return Err(StepError::config(format!(
                "cannot start `{}`: `{}` has already finished",
                names.join("`, `"),
                self.inner.path
            )));
        }

        let sanitized: Vec<bool> = definitions
            .iter()
            .map(|d| {
                let options = d.options();
                !options.ignore && options.resolve(self.inner.flags).any()
            })
            .collect();

        if self.inner.active.load(Ordering::SeqCst) > 0 {
            let siblings_sanitized = self.inner.sanitized.load(Ordering::SeqCst) > 0;
            let runnable = definitions.iter().zip(&sanitized).find(|(d, own)| {
                !d.options().ignore && (**own || siblings_sanitized)
            });
            if let Some((definition, _)) = runnable {
                return Err(StepError::config(format!(
                    "`{}` cannot start while sibling steps under `{}` are still running with \
                     sanitizers enabled; await each step before starting the next one, or \
                     disable sanitize_ops, sanitize_resources and sanitize_exit on all of them",
                    definition.name(),
                    self.inner.path
                )));
            }
        }

        reserve_names(&names, &mut taken, Some(&self.inner.path))?;
        Ok(sanitized
            .into_iter()
            .map(|sanitized| ActiveStep::enter(&self.inner, sanitized))
            .collect())
    }

    fn record(&self, result: &StepResult) {
        self.inner.children.lock().push(result.clone());
    }

    /// Mark the body as returned. Yields the number of steps still in flight.
    pub(crate) fn close(&self) -> usize {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.active.load(Ordering::SeqCst)
    }

    pub(crate) fn take_children(&self) -> Vec<StepResult> {
        std::mem::take(&mut *self.inner.children.lock())
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("path", &self.inner.path)
            .field("sanitizers", &self.inner.flags)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Counts a child step as in flight until dropped
struct ActiveStep {
    inner: Arc<ContextInner>,
    sanitized: bool,
}

impl ActiveStep {
    fn enter(inner: &Arc<ContextInner>, sanitized: bool) -> Self {
        inner.active.fetch_add(1, Ordering::SeqCst);
        if sanitized {
            inner.sanitized.fetch_add(1, Ordering::SeqCst);
        }
        Self {
            inner: inner.clone(),
            sanitized,
        }
    }
}

impl Drop for ActiveStep {
    fn drop(&mut self) {
        if self.sanitized {
            self.inner.sanitized.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}
