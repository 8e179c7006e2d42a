//! Test execution engine
//!
//! Runs units and their nested steps, sequentially or as concurrent sibling
//! batches.

mod context;
mod parallel;
mod runner;
mod step;

pub use context::TestContext;
pub use parallel::ConcurrencyCoordinator;
pub use runner::TestRunner;
pub use step::{StepDefinition, StepFuture};

pub(crate) use step::{execute_unit, HookCall, HookPlan};
