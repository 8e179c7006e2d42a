//! Suite tree
//!
//! Suites and tests are declared ahead of execution, either by nesting closures
//! (`describe(name, |s| s.it(..))`) or with explicit parent handles
//! (`describe_with(DescribeOptions::new(name).suite(parent))`). Both styles
//! produce the same arena of nodes. `build()` validates it and freezes it into
//! an immutable [`SuiteTree`].

use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::fixture::Fixture;
use super::hooks::{hook_fn, HookFn, HookSet};
use crate::error::StepError;
use crate::executor::{StepFuture, TestContext};
use crate::models::StepOptions;

/// Body of a test
pub type TestFn<F> = Arc<dyn Fn(TestContext, Fixture<F>) -> StepFuture + Send + Sync>;

fn test_fn<F, B, Fut>(body: B) -> TestFn<F>
where
    F: Send + 'static,
    B: Fn(TestContext, Fixture<F>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, fixture| body(ctx, fixture).boxed())
}

/// Handle to a suite inside the builder that created it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SuiteId(usize);

/// Handle to a test inside the builder that created it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TestId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    Suite(SuiteId),
    Test(TestId),
}

pub struct SuiteNode<F> {
    name: String,
    parent: Option<SuiteId>,
    options: StepOptions,
    hooks: HookSet<F>,
    children: Vec<Node>,
}

impl<F> SuiteNode<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<SuiteId> {
        self.parent
    }

    pub fn options(&self) -> StepOptions {
        self.options
    }

    pub fn hooks(&self) -> &HookSet<F> {
        &self.hooks
    }

    /// Tests and nested suites in declaration order
    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

pub struct TestNode<F> {
    name: String,
    suite: SuiteId,
    options: StepOptions,
    body: TestFn<F>,
}

impl<F> TestNode<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn suite(&self) -> SuiteId {
        self.suite
    }

    pub fn options(&self) -> StepOptions {
        self.options
    }

    pub(crate) fn body(&self) -> &TestFn<F> {
        &self.body
    }
}

/// Configuration form of `describe`
pub struct DescribeOptions<F> {
    name: String,
    suite: Option<SuiteId>,
    options: StepOptions,
    before_each: Vec<HookFn<F>>,
    after_each: Vec<HookFn<F>>,
}

impl<F: Send + 'static> DescribeOptions<F> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suite: None,
            options: StepOptions::default(),
            before_each: Vec::new(),
            after_each: Vec::new(),
        }
    }

    /// Nest under `parent`
    pub fn suite(mut self, parent: SuiteId) -> Self {
        self.suite = Some(parent);
        self
    }

    pub fn options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ignore(mut self, ignore: bool) -> Self {
        self.options = self.options.ignore(ignore);
        self
    }

    pub fn before_each<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.before_each.push(hook_fn(hook));
        self
    }

    pub fn after_each<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.after_each.push(hook_fn(hook));
        self
    }
}

/// Configuration form of `it`
pub struct ItOptions<F> {
    name: String,
    options: StepOptions,
    body: TestFn<F>,
}

impl<F: Send + 'static> ItOptions<F> {
    pub fn new<B, Fut>(name: impl Into<String>, body: B) -> Self
    where
        B: Fn(TestContext, Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            options: StepOptions::default(),
            body: test_fn(body),
        }
    }

    pub fn options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ignore(mut self, ignore: bool) -> Self {
        self.options = self.options.ignore(ignore);
        self
    }
}

/// Mutable arena of suites and tests
pub struct SuiteBuilder<F> {
    suites: Vec<SuiteNode<F>>,
    tests: Vec<TestNode<F>>,
    roots: Vec<SuiteId>,
    errors: Vec<String>,
}

impl<F: Send + 'static> SuiteBuilder<F> {
    pub fn new() -> Self {
        Self {
            suites: Vec::new(),
            tests: Vec::new(),
            roots: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Declare a root suite and fill it through `define`
    pub fn describe<D>(&mut self, name: impl Into<String>, define: D) -> SuiteId
    where
        D: FnOnce(&mut SuiteScope<'_, F>),
    {
        let id = self.describe_with(DescribeOptions::new(name));
        define(&mut self.scope(id));
        id
    }

    /// Declare a suite, nested when `options` names a parent
    pub fn describe_with(&mut self, options: DescribeOptions<F>) -> SuiteId {
        let DescribeOptions {
            name,
            suite: parent,
            options,
            before_each,
            after_each,
        } = options;
        let id = SuiteId(self.suites.len());

        match parent {
            None => self.roots.push(id),
            Some(parent) => match self.suites.get_mut(parent.0) {
                Some(node) => node.children.push(Node::Suite(id)),
                None => self
                    .errors
                    .push(format!("suite `{name}` refers to unknown parent {parent:?}")),
            },
        }

        self.suites.push(SuiteNode {
            name,
            parent,
            options,
            hooks: HookSet::new(before_each, after_each),
            children: Vec::new(),
        });
        id
    }

    /// Implicit-nesting view of an existing suite
    pub fn scope(&mut self, suite: SuiteId) -> SuiteScope<'_, F> {
        SuiteScope {
            builder: self,
            suite,
        }
    }

    pub fn it<B, Fut>(&mut self, suite: SuiteId, name: impl Into<String>, body: B) -> Option<TestId>
    where
        B: Fn(TestContext, Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.it_with(suite, ItOptions::new(name, body))
    }

    /// Declare a test in `suite`. `None` if the handle is unknown; `build()` then
    /// reports it.
    pub fn it_with(&mut self, suite: SuiteId, options: ItOptions<F>) -> Option<TestId> {
        let id = TestId(self.tests.len());
        match self.suites.get_mut(suite.0) {
            Some(node) => node.children.push(Node::Test(id)),
            None => {
                self.errors.push(format!(
                    "test `{}` refers to unknown suite {suite:?}",
                    options.name
                ));
                return None;
            }
        }

        self.tests.push(TestNode {
            name: options.name,
            suite,
            options: options.options,
            body: options.body,
        });
        Some(id)
    }

    pub fn before_each<H, Fut>(&mut self, suite: SuiteId, hook: H)
    where
        H: Fn(Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        match self.suites.get_mut(suite.0) {
            Some(node) => node.hooks.push_before(hook_fn(hook)),
            None => self
                .errors
                .push(format!("before_each refers to unknown suite {suite:?}")),
        }
    }

    pub fn after_each<H, Fut>(&mut self, suite: SuiteId, hook: H)
    where
        H: Fn(Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        match self.suites.get_mut(suite.0) {
            Some(node) => node.hooks.push_after(hook_fn(hook)),
            None => self
                .errors
                .push(format!("after_each refers to unknown suite {suite:?}")),
        }
    }

    /// Validate and freeze
    pub fn build(self) -> Result<SuiteTree<F>, StepError> {
        let mut errors = self.errors;
        let tree = SuiteTree {
            suites: self.suites,
            tests: self.tests,
            roots: self.roots,
        };

        let root_names = tree.roots.iter().map(|id| tree.suite(*id).name());
        check_siblings("the root", root_names, &mut errors);
        for suite in &tree.suites {
            let names = suite.children.iter().map(|node| tree.node_name(*node));
            check_siblings(&suite.name, names, &mut errors);
        }

        if !errors.is_empty() {
            return Err(StepError::config(errors.join("; ")));
        }

        debug!(
            "Built suite tree: {} suites, {} tests",
            tree.suites.len(),
            tree.tests.len()
        );
        Ok(tree)
    }
}

impl<F: Send + 'static> Default for SuiteBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_siblings<'a>(
    parent: &str,
    names: impl Iterator<Item = &'a str>,
    errors: &mut Vec<String>,
) {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            errors.push(format!("empty name under `{parent}`"));
        } else if !seen.insert(name) {
            errors.push(format!("duplicate name `{name}` under `{parent}`"));
        }
    }
}

/// Builder view while inside a `describe` closure
pub struct SuiteScope<'a, F> {
    builder: &'a mut SuiteBuilder<F>,
    suite: SuiteId,
}

impl<F: Send + 'static> SuiteScope<'_, F> {
    pub fn id(&self) -> SuiteId {
        self.suite
    }

    pub fn it<B, Fut>(&mut self, name: impl Into<String>, body: B) -> Option<TestId>
    where
        B: Fn(TestContext, Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.builder.it(self.suite, name, body)
    }

    pub fn it_with(&mut self, options: ItOptions<F>) -> Option<TestId> {
        self.builder.it_with(self.suite, options)
    }

    pub fn describe<D>(&mut self, name: impl Into<String>, define: D) -> SuiteId
    where
        D: FnOnce(&mut SuiteScope<'_, F>),
    {
        self.describe_with(DescribeOptions::new(name), define)
    }

    /// Nested suite with options. The parent is always this scope's suite.
    pub fn describe_with<D>(&mut self, options: DescribeOptions<F>, define: D) -> SuiteId
    where
        D: FnOnce(&mut SuiteScope<'_, F>),
    {
        let id = self.builder.describe_with(options.suite(self.suite));
        define(&mut self.builder.scope(id));
        id
    }

    pub fn before_each<H, Fut>(&mut self, hook: H)
    where
        H: Fn(Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.builder.before_each(self.suite, hook);
    }

    pub fn after_each<H, Fut>(&mut self, hook: H)
    where
        H: Fn(Fixture<F>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.builder.after_each(self.suite, hook);
    }
}

/// Immutable suite tree
///
/// Handles are only meaningful for the tree built from the builder that issued
/// them; indexing with a foreign handle panics.
pub struct SuiteTree<F> {
    suites: Vec<SuiteNode<F>>,
    tests: Vec<TestNode<F>>,
    roots: Vec<SuiteId>,
}

impl<F> SuiteTree<F> {
    pub fn roots(&self) -> &[SuiteId] {
        &self.roots
    }

    pub fn suite(&self, id: SuiteId) -> &SuiteNode<F> {
        &self.suites[id.0]
    }

    pub fn test(&self, id: TestId) -> &TestNode<F> {
        &self.tests[id.0]
    }

    pub fn suite_count(&self) -> usize {
        self.suites.len()
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    fn node_name(&self, node: Node) -> &str {
        match node {
            Node::Suite(id) => self.suite(id).name(),
            Node::Test(id) => self.test(id).name(),
        }
    }

    /// `suite` and its ancestors, outermost first
    pub fn ancestors(&self, suite: SuiteId) -> Vec<SuiteId> {
        let mut chain = vec![suite];
        let mut current = self.suite(suite).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.suite(parent).parent;
        }
        chain.reverse();
        chain
    }

    /// Every node path, depth-first in declaration order
    pub fn outline(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for root in &self.roots {
            self.outline_node(Node::Suite(*root), None, &mut lines);
        }
        lines
    }

    fn outline_node(&self, node: Node, parent: Option<&str>, lines: &mut Vec<String>) {
        let path = match parent {
            Some(parent) => format!("{parent} > {}", self.node_name(node)),
            None => self.node_name(node).to_string(),
        };
        lines.push(path.clone());
        if let Node::Suite(id) = node {
            for child in self.suite(id).children() {
                self.outline_node(*child, Some(&path), lines);
            }
        }
    }
}

impl<F> fmt::Debug for SuiteTree<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteTree")
            .field("roots", &self.roots.len())
            .field("suites", &self.suites.len())
            .field("tests", &self.tests.len())
            .finish()
    }
}
