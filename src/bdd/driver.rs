//! BDD driver
//!
//! Maps a suite tree onto the step engine: every suite runs as a step, every
//! test runs as a child step wrapped in its inherited hook chain with a fresh
//! fixture.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info};

use super::fixture::Fixture;
use super::hooks::resolve_hooks;
use super::suite::{Node, SuiteId, SuiteTree, TestId};
use crate::executor::{execute_unit, HookPlan, StepDefinition, TestContext, TestRunner};
use crate::models::StepResult;

/// Run every root suite in declaration order
pub(crate) async fn run_tree<F>(runner: &TestRunner, tree: Arc<SuiteTree<F>>) -> Vec<StepResult>
where
    F: Default + Send + 'static,
{
    let mut results = Vec::with_capacity(tree.roots().len());
    for root in tree.roots() {
        let definition = suite_step(&tree, *root);
        let result = execute_unit(runner.root_scope(), definition, HookPlan::default()).await;
        info!("  {}", result);
        results.push(result);
    }
    results
}

fn suite_step<F>(tree: &Arc<SuiteTree<F>>, id: SuiteId) -> StepDefinition
where
    F: Default + Send + 'static,
{
    let suite = tree.suite(id);
    let tree = tree.clone();
    StepDefinition::new(suite.name(), move |ctx| run_suite(tree, id, ctx))
        .with_options(suite.options())
}

fn run_suite<F>(
    tree: Arc<SuiteTree<F>>,
    id: SuiteId,
    ctx: TestContext,
) -> BoxFuture<'static, anyhow::Result<()>>
where
    F: Default + Send + 'static,
{
    async move {
        for node in tree.suite(id).children() {
            match *node {
                Node::Suite(child) => {
                    ctx.run_step(suite_step(&tree, child)).await?;
                }
                Node::Test(test) => {
                    let (definition, hooks) = test_step(&tree, test);
                    ctx.run_hooked(definition, hooks).await?;
                }
            }
        }
        Ok(())
    }
    .boxed()
}

fn test_step<F>(tree: &SuiteTree<F>, id: TestId) -> (StepDefinition, HookPlan)
where
    F: Default + Send + 'static,
{
    let test = tree.test(id);
    let fixture = Fixture::new(F::default());
    let hooks = resolve_hooks(tree, id);
    debug!(
        "{}: {} before_each, {} after_each",
        test.name(),
        hooks.before.len(),
        hooks.after.len()
    );
    let hooks = hooks.bind(&fixture);

    let body = test.body().clone();
    let definition =
        StepDefinition::new(test.name(), move |ctx| body(ctx, fixture)).with_options(test.options());
    (definition, hooks)
}
