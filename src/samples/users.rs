//! User suites
//!
//! The same `User` suite declared twice: once by nesting closures and once with
//! explicit suite handles. Each test gets its own [`UserFixture`], so the user
//! registry starts empty for every test.

use anyhow::{anyhow, bail, ensure, Context, Result};
use serde::Serialize;
use std::collections::HashMap;

use crate::bdd::{DescribeOptions, Fixture, SuiteBuilder, SuiteTree};
use crate::error::StepError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub name: String,
    pub age: Option<u32>,
}

impl User {
    pub fn get_age(&self) -> Result<u32> {
        self.age.ok_or_else(|| anyhow!("Age unknown"))
    }

    pub fn set_age(&mut self, age: u32) {
        self.age = Some(age);
    }
}

/// Registry of created users, keyed by name
#[derive(Debug, Default)]
pub struct UserStore {
    users: HashMap<String, User>,
}

impl UserStore {
    /// Create a user and register it
    pub fn create(&mut self, name: impl Into<String>) -> User {
        let user = User {
            name: name.into(),
            age: None,
        };
        self.users.insert(user.name.clone(), user.clone());
        user
    }

    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

/// Per-test state of the user suites
#[derive(Debug, Default)]
pub struct UserFixture {
    pub store: UserStore,
    /// Set by the `age` suite's before_each
    pub user: Option<User>,
}

async fn users_initially_empty(fixture: Fixture<UserFixture>) -> Result<()> {
    let fixture = fixture.lock().await;
    ensure!(
        fixture.store.is_empty(),
        "expected no users, found {}",
        fixture.store.len()
    );
    Ok(())
}

async fn constructor(fixture: Fixture<UserFixture>) -> Result<()> {
    let mut fixture = fixture.lock().await;
    let outcome = check_constructor(&mut fixture.store);
    fixture.store.clear();
    outcome
}

fn check_constructor(store: &mut UserStore) -> Result<()> {
    let user = store.create("Kyle");
    ensure!(user.name == "Kyle", "unexpected name {}", user.name);
    ensure!(
        store.get("Kyle") == Some(&user),
        "user was not registered under its name"
    );
    Ok(())
}

async fn create_kyle(fixture: Fixture<UserFixture>) -> Result<()> {
    let mut fixture = fixture.lock().await;
    let user = fixture.store.create("Kyle");
    fixture.user = Some(user);
    Ok(())
}

async fn clear_users(fixture: Fixture<UserFixture>) -> Result<()> {
    fixture.lock().await.store.clear();
    Ok(())
}

async fn get_age(fixture: Fixture<UserFixture>) -> Result<()> {
    let mut fixture = fixture.lock().await;
    let user = fixture.user.as_mut().context("no user was set up")?;
    match user.get_age() {
        Ok(age) => bail!("expected an unknown age, got {age}"),
        Err(e) => ensure!(e.to_string() == "Age unknown", "unexpected error: {e}"),
    }
    user.age = Some(18);
    ensure!(user.get_age()? == 18, "age was not updated");
    Ok(())
}

async fn set_age(fixture: Fixture<UserFixture>) -> Result<()> {
    let mut fixture = fixture.lock().await;
    let user = fixture.user.as_mut().context("no user was set up")?;
    user.set_age(18);
    ensure!(user.get_age()? == 18, "age was not updated");
    Ok(())
}

/// Suites declared by nesting `describe` closures
pub fn nested_suite() -> Result<SuiteTree<UserFixture>, StepError> {
    let mut builder = SuiteBuilder::<UserFixture>::new();
    builder.describe("User", |user| {
        user.it("users initially empty", |_t, f| users_initially_empty(f));
        user.it("constructor", |_t, f| constructor(f));

        user.describe("age", |age| {
            age.before_each(create_kyle);
            age.after_each(clear_users);
            age.it("getAge", |_t, f| get_age(f));
            age.it("setAge", |_t, f| set_age(f));
        });
    });
    builder.build()
}

/// Suites declared with explicit handles
pub fn flat_suite() -> Result<SuiteTree<UserFixture>, StepError> {
    let mut builder = SuiteBuilder::<UserFixture>::new();

    let user_tests = builder.describe_with(DescribeOptions::new("User"));
    builder.it(user_tests, "users initially empty", |_t, f| {
        users_initially_empty(f)
    });
    builder.it(user_tests, "constructor", |_t, f| constructor(f));

    let age_tests = builder.describe_with(
        DescribeOptions::new("age")
            .suite(user_tests)
            .before_each(create_kyle)
            .after_each(clear_users),
    );
    builder.it(age_tests, "getAge", |_t, f| get_age(f));
    builder.it(age_tests, "setAge", |_t, f| set_age(f));

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TestRunner;
    use crate::results::ReportPolicy;

    #[test]
    fn test_user_age() {
        let mut store = UserStore::default();
        let mut user = store.create("Kyle");
        assert_eq!(user.get_age().unwrap_err().to_string(), "Age unknown");
        user.set_age(18);
        assert_eq!(user.get_age().unwrap(), 18);
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_both_styles_have_the_same_outline() {
        let nested = nested_suite().unwrap();
        let flat = flat_suite().unwrap();
        assert_eq!(nested.outline(), flat.outline());
        assert_eq!(nested.test_count(), 4);
    }

    #[tokio::test]
    async fn test_nested_suite_passes() {
        let report = TestRunner::default()
            .run_suites(nested_suite().unwrap())
            .await;
        assert_eq!(report.failed, 0, "{:?}", report.failures());
        assert_eq!(report.passed, 6);
        assert!(report.is_success(ReportPolicy::Strict));
    }

    #[tokio::test]
    async fn test_flat_suite_passes() {
        let report = TestRunner::default()
            .run_suites(flat_suite().unwrap())
            .await;
        assert_eq!(report.failed, 0, "{:?}", report.failures());
        assert!(report.find(&["User", "age", "setAge"]).unwrap().is_passed());
    }
}
