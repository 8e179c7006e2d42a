//! Hook chains
//!
//! `before_each` / `after_each` registrations per suite and the resolver that
//! computes the chain a test inherits from its ancestors.

use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::fixture::Fixture;
use super::suite::{SuiteTree, TestId};
use crate::executor::{HookCall, HookPlan, StepFuture};

/// A registered hook
pub type HookFn<F> = Arc<dyn Fn(Fixture<F>) -> StepFuture + Send + Sync>;

pub(crate) fn hook_fn<F, H, Fut>(hook: H) -> HookFn<F>
where
    F: Send + 'static,
    H: Fn(Fixture<F>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |fixture| hook(fixture).boxed())
}

/// Hooks attached to one suite, in registration order
pub struct HookSet<F> {
    before_each: Vec<HookFn<F>>,
    after_each: Vec<HookFn<F>>,
}

impl<F> HookSet<F> {
    pub(crate) fn new(before_each: Vec<HookFn<F>>, after_each: Vec<HookFn<F>>) -> Self {
        Self {
            before_each,
            after_each,
        }
    }

    pub fn before_each(&self) -> &[HookFn<F>] {
        &self.before_each
    }

    pub fn after_each(&self) -> &[HookFn<F>] {
        &self.after_each
    }

    pub fn is_empty(&self) -> bool {
        self.before_each.is_empty() && self.after_each.is_empty()
    }

    pub(crate) fn push_before(&mut self, hook: HookFn<F>) {
        self.before_each.push(hook);
    }

    pub(crate) fn push_after(&mut self, hook: HookFn<F>) {
        self.after_each.push(hook);
    }
}

impl<F> Default for HookSet<F> {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl<F> fmt::Debug for HookSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("before_each", &self.before_each.len())
            .field("after_each", &self.after_each.len())
            .finish()
    }
}

/// Effective hook chain of one test
pub struct ResolvedHooks<F> {
    /// Outermost suite first
    pub before: Vec<HookFn<F>>,
    /// Innermost suite first
    pub after: Vec<HookFn<F>>,
}

impl<F: Send + 'static> ResolvedHooks<F> {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Bind every hook to the fixture of one test execution
    pub(crate) fn bind(self, fixture: &Fixture<F>) -> HookPlan {
        let call = |hook: HookFn<F>| -> HookCall {
            let fixture = fixture.clone();
            Box::new(move || hook(fixture))
        };
        HookPlan {
            before: self.before.into_iter().map(call).collect(),
            after: self.after.into_iter().map(call).collect(),
        }
    }
}

/// Walk the ancestors of `test`. `before_each` hooks come root-to-leaf and
/// `after_each` hooks leaf-to-root; within one suite both keep registration order.
pub fn resolve_hooks<F>(tree: &SuiteTree<F>, test: TestId) -> ResolvedHooks<F> {
    let chain = tree.ancestors(tree.test(test).suite());

    let before = chain
        .iter()
        .flat_map(|id| tree.suite(*id).hooks().before_each().iter().cloned())
        .collect();
    let after = chain
        .iter()
        .rev()
        .flat_map(|id| tree.suite(*id).hooks().after_each().iter().cloned())
        .collect();

    ResolvedHooks { before, after }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::{Node, SuiteBuilder};
    use parking_lot::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn record(trace: &Trace, entry: &'static str) -> impl Fn(Fixture<()>) -> StepFuture {
        let trace = trace.clone();
        move |_fixture| {
            trace.lock().push(entry.to_string());
            async { Ok(()) }.boxed()
        }
    }

    async fn run_chain(hooks: ResolvedHooks<()>) {
        let plan = hooks.bind(&Fixture::new(()));
        for hook in plan.before {
            hook().await.unwrap();
        }
        for hook in plan.after {
            hook().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_chain_order() {
        let trace: Trace = Arc::default();
        let mut builder = SuiteBuilder::<()>::new();
        builder.describe("A", |a| {
            a.before_each(record(&trace, "a1"));
            a.after_each(record(&trace, "a2"));
            a.describe("B", |b| {
                b.before_each(record(&trace, "b1"));
                b.after_each(record(&trace, "b2"));
                b.it("x", |_t, _f| async { Ok(()) });
            });
        });
        let tree = builder.build().unwrap();

        let b = match tree.suite(tree.roots()[0]).children()[0] {
            Node::Suite(id) => id,
            Node::Test(_) => unreachable!(),
        };
        let x = match tree.suite(b).children()[0] {
            Node::Test(id) => id,
            Node::Suite(_) => unreachable!(),
        };

        run_chain(resolve_hooks(&tree, x)).await;
        assert_eq!(*trace.lock(), vec!["a1", "b1", "b2", "a2"]);
    }

    #[tokio::test]
    async fn test_registration_order_within_suite() {
        let trace: Trace = Arc::default();
        let mut builder = SuiteBuilder::<()>::new();
        let suite = builder.describe("A", |_| {});
        builder.before_each(suite, record(&trace, "first"));
        builder.before_each(suite, record(&trace, "second"));
        builder.after_each(suite, record(&trace, "third"));
        builder.after_each(suite, record(&trace, "fourth"));
        builder.it(suite, "x", |_t, _f| async { Ok(()) });
        let tree = builder.build().unwrap();

        let x = match tree.suite(suite).children()[0] {
            Node::Test(id) => id,
            Node::Suite(_) => unreachable!(),
        };
        run_chain(resolve_hooks(&tree, x)).await;
        assert_eq!(*trace.lock(), vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_no_hooks_resolves_empty() {
        let mut builder = SuiteBuilder::<()>::new();
        let suite = builder.describe("plain", |s| {
            s.it("x", |_t, _f| async { Ok(()) });
        });
        let tree = builder.build().unwrap();
        let x = match tree.suite(suite).children()[0] {
            Node::Test(id) => id,
            Node::Suite(_) => unreachable!(),
        };

        let resolved = resolve_hooks(&tree, x);
        assert!(resolved.is_empty());
        // pure: resolving again gives the same chain
        assert!(resolve_hooks(&tree, x).is_empty());
    }
}
