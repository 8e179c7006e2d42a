//! Step engine
//!
//! Executes a single unit: ignore check, sanitizer snapshot, before_each chain,
//! body, pending-step check, after_each chain, sanitizer diff. Every path ends in
//! a terminal [`StepResult`]; only misuse of the API is reported as an error, and
//! that happens before anything runs.

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::TestContext;
use crate::error::StepError;
use crate::models::{
    ErrorInfo, EventSink, HookPhase, SanitizerFlags, StepEvent, StepOptions, StepResult,
};
use crate::sanitizer::{ResourceMonitor, SanitizerGuard};
use crate::utils::Timer;

/// Future returned by bodies and hooks
pub type StepFuture = BoxFuture<'static, anyhow::Result<()>>;

type StepBody = Box<dyn FnOnce(TestContext) -> StepFuture + Send>;

/// A hook bound to its fixture, ready to be called once
pub(crate) type HookCall = Box<dyn FnOnce() -> StepFuture + Send>;

/// Hooks wrapped around one unit's body
#[derive(Default)]
pub(crate) struct HookPlan {
    pub(crate) before: Vec<HookCall>,
    pub(crate) after: Vec<HookCall>,
}

/// A named unit of work and its options
pub struct StepDefinition {
    name: String,
    options: StepOptions,
    body: StepBody,
}

impl StepDefinition {
    pub fn new<B, Fut>(name: impl Into<String>, body: B) -> Self
    where
        B: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            options: StepOptions::default(),
            body: Box::new(move |ctx| body(ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> StepOptions {
        self.options
    }

    pub fn with_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ignore(mut self, ignore: bool) -> Self {
        self.options = self.options.ignore(ignore);
        self
    }

    pub fn sanitize_ops(mut self, enabled: bool) -> Self {
        self.options = self.options.sanitize_ops(enabled);
        self
    }

    pub fn sanitize_resources(mut self, enabled: bool) -> Self {
        self.options = self.options.sanitize_resources(enabled);
        self
    }

    pub fn sanitize_exit(mut self, enabled: bool) -> Self {
        self.options = self.options.sanitize_exit(enabled);
        self
    }

    pub fn without_sanitizers(mut self) -> Self {
        self.options = self.options.without_sanitizers();
        self
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// What a parent hands down to the units it starts
#[derive(Clone)]
pub(crate) struct Scope {
    pub(crate) path: Option<String>,
    pub(crate) flags: SanitizerFlags,
    pub(crate) guard: Arc<SanitizerGuard>,
    pub(crate) events: Option<EventSink>,
    pub(crate) max_concurrent: usize,
}

impl Scope {
    /// Scope of a root unit. Each root gets its own guard.
    pub(crate) fn root(
        monitor: Arc<dyn ResourceMonitor>,
        flags: SanitizerFlags,
        events: Option<EventSink>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            path: None,
            flags,
            guard: Arc::new(SanitizerGuard::new(monitor)),
            events,
            max_concurrent,
        }
    }

    pub(crate) fn nested(&self, path: String, flags: SanitizerFlags) -> Self {
        Self {
            path: Some(path),
            flags,
            ..self.clone()
        }
    }

    fn path_of(&self, name: &str) -> String {
        match &self.path {
            Some(parent) => format!("{parent} > {name}"),
            None => name.to_string(),
        }
    }

    fn emit(&self, event: StepEvent) {
        if let Some(sink) = &self.events {
            // a closed receiver only means nobody is listening
            let _ = sink.send(event);
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), StepError> {
    if name.trim().is_empty() {
        return Err(StepError::config("step name must not be empty"));
    }
    Ok(())
}

/// Check `names` against each other and against `taken`, then reserve them.
/// Nothing is reserved when any name is rejected.
pub(crate) fn reserve_names(
    names: &[&str],
    taken: &mut HashSet<String>,
    parent: Option<&str>,
) -> Result<(), StepError> {
    let mut batch = HashSet::new();
    for name in names {
        validate_name(name)?;
        if taken.contains(*name) || !batch.insert(*name) {
            return Err(StepError::config(match parent {
                Some(parent) => format!("duplicate step name `{name}` under `{parent}`"),
                None => format!("duplicate test name `{name}`"),
            }));
        }
    }
    taken.extend(names.iter().map(|name| name.to_string()));
    Ok(())
}

/// Run one unit to a terminal state
pub(crate) fn execute_unit(
    scope: Scope,
    definition: StepDefinition,
    hooks: HookPlan,
) -> BoxFuture<'static, StepResult> {
    async move {
        let StepDefinition {
            name,
            options,
            body,
        } = definition;
        let path = scope.path_of(&name);

        if options.ignore {
            debug!("Ignoring {}", path);
            scope.emit(StepEvent::Ignored { path });
            return StepResult::ignored(name);
        }

        // fixed for the whole execution
        let flags = options.resolve(scope.flags);
        let ctx = TestContext::new(name.clone(), path.clone(), flags, &scope);

        debug!("Running {} ({})", path, flags);
        scope.emit(StepEvent::Started { path: path.clone() });
        let timer = Timer::start(path.clone());
        let before = flags.any().then(|| scope.guard.snapshot());

        let mut failure: Option<StepError> = None;

        for hook in hooks.before {
            if let Err(error) = guarded(hook).await {
                failure = Some(StepError::hook(HookPhase::BeforeEach, error));
                break;
            }
        }

        if failure.is_none() {
            let body_ctx = ctx.clone();
            if let Err(error) = guarded(move || body(body_ctx)).await {
                failure = Some(StepError::Body(error));
            }
        }

        let pending = ctx.close();
        if pending > 0 && failure.is_none() {
            failure = Some(StepError::PendingSteps { count: pending });
        }

        for hook in hooks.after {
            if let Err(error) = guarded(hook).await {
                let error = StepError::hook(HookPhase::AfterEach, error);
                match failure {
                    None => failure = Some(error),
                    Some(_) => warn!("{}: additional failure: {}", path, error),
                }
            }
        }

        if let Some(before) = before {
            let leaks = scope.guard.diff(&before, &scope.guard.snapshot(), flags);
            if !leaks.is_empty() {
                let error = StepError::Leak { leaks };
                match failure {
                    None => failure = Some(error),
                    Some(_) => warn!("{}: additional failure: {}", path, error),
                }
            }
        }

        let duration_ms = timer.stop();
        let children = ctx.take_children();
        let result = match failure {
            None => StepResult::passed(name, duration_ms, children),
            Some(error) => {
                warn!("{} failed: {}", path, error);
                StepResult::failed(name, duration_ms, ErrorInfo::from(&error), children)
            }
        };

        info!("{} {} [{}ms]", result.state.symbol(), path, duration_ms);
        scope.emit(StepEvent::Finished {
            path,
            state: result.state,
            duration_ms,
        });
        result
    }
    .boxed()
}

/// Call a body or hook, turning panics into errors
async fn guarded<C>(call: C) -> anyhow::Result<()>
where
    C: FnOnce() -> StepFuture,
{
    let future = match std::panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(future) => future,
        Err(payload) => return Err(panic_error(payload)),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panic_error(payload)),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    anyhow!("panicked: {message}")
}
