//! Stepwise - hierarchical test execution engine
//!
//! Tests are async bodies that receive a [`TestContext`] and can open nested
//! steps, sequentially or as a concurrent batch. A BDD layer builds
//! `describe`/`it` trees with `before_each`/`after_each` chains on top of the
//! same engine. Root units run under resource sanitizers that report pending
//! async ops and open resources left behind by the unit that created them.
//!
//! ## Example
//!
//! ```no_run
//! use stepwise::{StepDefinition, TestRunner};
//!
//! # async fn demo() -> Result<(), stepwise::StepError> {
//! let runner = TestRunner::default();
//! let result = runner
//!     .run_test(StepDefinition::new("outer", |t| async move {
//!         t.step("inner", |_t| async { Ok(()) }).await?;
//!         Ok(())
//!     }))
//!     .await?;
//! assert!(result.is_passed());
//! # Ok(())
//! # }
//! ```

pub mod bdd;
pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod output;
pub mod results;
pub mod samples;
pub mod sanitizer;
pub mod utils;

pub use bdd::{DescribeOptions, Fixture, ItOptions, SuiteBuilder, SuiteTree};
pub use config::AppConfig;
pub use error::StepError;
pub use executor::{ConcurrencyCoordinator, StepDefinition, TestContext, TestRunner};
pub use models::{SanitizerFlags, StepOptions, StepResult, StepState};
pub use results::{ReportPolicy, RunReport};
pub use sanitizer::{ResourceMonitor, ResourceTracker};
