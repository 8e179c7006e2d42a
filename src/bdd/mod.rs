//! BDD layer
//!
//! `describe` / `it` suites with inherited `before_each` / `after_each` hooks and a
//! per-test fixture, executed on top of the step engine.

mod driver;
mod fixture;
mod hooks;
mod suite;

pub use fixture::Fixture;
pub use hooks::{resolve_hooks, HookFn, HookSet, ResolvedHooks};
pub use suite::{
    DescribeOptions, ItOptions, Node, SuiteBuilder, SuiteId, SuiteNode, SuiteScope, SuiteTree,
    TestFn, TestId, TestNode,
};

pub(crate) use driver::run_tree;
