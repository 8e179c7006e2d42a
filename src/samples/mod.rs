//! Bundled sample suites
//!
//! Runnable from the command line with `stepwise run --sample <name>`.

pub mod database;
pub mod users;

use std::fmt;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::StepError;
use crate::executor::TestRunner;
use crate::models::EventSink;
use crate::results::RunReport;
use crate::sanitizer::ResourceTracker;

pub use database::{database_test, Database};
pub use users::{flat_suite, nested_suite, User, UserFixture, UserStore};

/// A bundled sample
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sample {
    Database,
    UsersNested,
    UsersFlat,
}

impl Sample {
    pub fn all() -> Vec<Sample> {
        vec![Sample::Database, Sample::UsersNested, Sample::UsersFlat]
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "database" | "db" => Some(Sample::Database),
            "users-nested" | "nested" => Some(Sample::UsersNested),
            "users-flat" | "flat" => Some(Sample::UsersFlat),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sample::Database => "database",
            Sample::UsersNested => "users-nested",
            Sample::UsersFlat => "users-flat",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Sample::Database => {
                "Nested steps over an in-memory database: a failing step, an ignored step, a concurrent batch"
            }
            Sample::UsersNested => "User suite declared with nested describe closures",
            Sample::UsersFlat => "User suite declared with explicit suite handles",
        }
    }

    /// Run this sample on a fresh runner built from `config`
    pub async fn run(
        self,
        config: &AppConfig,
        events: Option<EventSink>,
    ) -> Result<RunReport, StepError> {
        let tracker = Arc::new(ResourceTracker::new());
        let mut runner = TestRunner::new(config).with_monitor(tracker.clone());
        if let Some(sink) = events {
            runner = runner.with_events(sink);
        }

        match self {
            Sample::Database => {
                let db = Arc::new(Database::new(tracker));
                runner.run_all(vec![database_test(db)]).await
            }
            Sample::UsersNested => Ok(runner.run_suites(nested_suite()?).await),
            Sample::UsersFlat => Ok(runner.run_suites(flat_suite()?).await),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
