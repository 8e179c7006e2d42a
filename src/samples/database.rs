//! Database sample
//!
//! Free-form nested steps over an in-memory database. The connection is a
//! tracked resource and every query is a tracked async op, so the sanitizers
//! see the database the way they would see a real driver.

use anyhow::{bail, ensure, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::executor::StepDefinition;
use crate::sanitizer::{ResourceId, ResourceTracker};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookRow {
    pub id: u64,
    pub title: String,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserRow>,
    books: Vec<BookRow>,
    next_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory database client
pub struct Database {
    tracker: Arc<ResourceTracker>,
    tables: Mutex<Tables>,
    connection: Mutex<Option<ResourceId>>,
}

impl Database {
    pub fn new(tracker: Arc<ResourceTracker>) -> Self {
        Self {
            tracker,
            tables: Mutex::new(Tables::default()),
            connection: Mutex::new(None),
        }
    }

    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            bail!("already connected");
        }
        self.tracker
            .track_op("connect", tokio::task::yield_now())
            .await;
        let id = self.tracker.open_resource("database connection");
        *self.connection.lock() = Some(id);
        debug!("Database connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Close the connection. `false` if it was not open.
    pub fn end(&self) -> bool {
        match self.connection.lock().take() {
            Some(id) => self.tracker.close_resource(id),
            None => false,
        }
    }

    /// `INSERT INTO users (name) VALUES (..) RETURNING *`
    pub async fn insert_user(&self, name: &str) -> Result<Vec<UserRow>> {
        self.ensure_connected()?;
        self.tracker
            .track_op("INSERT INTO users", async {
                tokio::task::yield_now().await;
                let mut tables = self.tables.lock();
                let row = UserRow {
                    id: tables.next_id(),
                    name: name.to_string(),
                };
                tables.users.push(row.clone());
                Ok(vec![row])
            })
            .await
    }

    /// `INSERT INTO books (title) VALUES (..) RETURNING *`
    pub async fn insert_book(&self, title: &str) -> Result<Vec<BookRow>> {
        self.ensure_connected()?;
        self.tracker
            .track_op("INSERT INTO books", async {
                tokio::task::yield_now().await;
                let mut tables = self.tables.lock();
                let row = BookRow {
                    id: tables.next_id(),
                    title: title.to_string(),
                };
                tables.books.push(row.clone());
                Ok(vec![row])
            })
            .await
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().users.len()
    }

    pub fn book_count(&self) -> usize {
        self.tables.lock().books.len()
    }

    fn ensure_connected(&self) -> Result<()> {
        ensure!(self.is_connected(), "not connected");
        Ok(())
    }
}

/// The `database` test: inserts, a failing nested step, an ignored step and a
/// concurrent batch
pub fn database_test(db: Arc<Database>) -> StepDefinition {
    StepDefinition::new("database", move |t| async move {
        db.connect().await?;

        let conn = db.clone();
        t.step("insert user", move |_t| async move {
            let users = conn.insert_user("Deno").await?;
            ensure!(users.len() == 1, "expected 1 row, got {}", users.len());
            ensure!(users[0].name == "Deno", "unexpected name {}", users[0].name);
            Ok(())
        })
        .await?;

        let conn = db.clone();
        t.step_with(
            StepDefinition::new("insert book", move |_t| async move {
                let books = conn.insert_book("The Deno Manual").await?;
                ensure!(books.len() == 1, "expected 1 row, got {}", books.len());
                ensure!(
                    books[0].title == "The Deno Manual",
                    "unexpected title {}",
                    books[0].title
                );
                Ok(())
            })
            .ignore(false)
            .sanitize_ops(true)
            .sanitize_resources(true)
            .sanitize_exit(true),
        )
        .await?;

        t.step("update and delete", |t| async move {
            // the failure stays in "update"; "delete" still runs
            t.step("update", |_t| async { bail!("Fail.") }).await?;
            t.step("delete", |_t| async { Ok(()) }).await?;
            Ok(())
        })
        .await?;

        let ran = t
            .step_with(StepDefinition::new("copy books", |_t| async { Ok(()) }).ignore(true))
            .await?;
        ensure!(!ran, "ignored step reported as run");

        let cases = (1..=3)
            .map(|case| {
                StepDefinition::new(format!("case {case}"), |_t| async { Ok(()) })
                    .without_sanitizers()
            })
            .collect();
        t.steps_concurrent(cases).await?;

        ensure!(db.end(), "connection was already closed");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::executor::TestRunner;
    use crate::models::{ErrorKind, StepState};
    use crate::results::ReportPolicy;

    fn setup() -> (Arc<ResourceTracker>, Arc<Database>, TestRunner) {
        let tracker = Arc::new(ResourceTracker::new());
        let db = Arc::new(Database::new(tracker.clone()));
        let runner = TestRunner::new(&AppConfig::default()).with_monitor(tracker.clone());
        (tracker, db, runner)
    }

    #[tokio::test]
    async fn test_queries_require_connection() {
        let (tracker, db, _) = setup();
        assert!(db.insert_user("Deno").await.is_err());

        db.connect().await.unwrap();
        assert!(db.connect().await.is_err());
        assert_eq!(db.insert_user("Deno").await.unwrap()[0].id, 1);
        assert_eq!(db.insert_book("Manual").await.unwrap()[0].id, 2);
        assert_eq!(tracker.pending_op_count(), 0);
        assert_eq!(tracker.open_resource_count(), 1);

        assert!(db.end());
        assert!(!db.end());
        assert_eq!(tracker.open_resource_count(), 0);
    }

    #[tokio::test]
    async fn test_database_run() {
        let (tracker, db, runner) = setup();
        let result = runner.run_test(database_test(db.clone())).await.unwrap();

        assert!(result.is_passed(), "{result}");
        assert!(result.child("insert user").unwrap().is_passed());
        assert!(result.child("insert book").unwrap().is_passed());

        let update = result.find(&["update and delete", "update"]).unwrap();
        assert!(update.is_failed());
        assert_eq!(update.error.as_ref().unwrap().message, "Fail.");
        assert!(result
            .find(&["update and delete", "delete"])
            .unwrap()
            .is_passed());
        assert!(result.child("update and delete").unwrap().is_passed());

        assert_eq!(result.child("copy books").unwrap().state, StepState::Ignored);
        for case in ["case 1", "case 2", "case 3"] {
            assert!(result.child(case).unwrap().is_passed());
        }

        let order: Vec<&str> = result.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "insert user",
                "insert book",
                "update and delete",
                "copy books",
                "case 1",
                "case 2",
                "case 3"
            ]
        );

        assert_eq!(db.user_count(), 1);
        assert_eq!(db.book_count(), 1);
        assert_eq!(tracker.open_resource_count(), 0);
    }

    #[tokio::test]
    async fn test_database_report_policies() {
        let (_, db, runner) = setup();
        let report = runner.run_all(vec![database_test(db)]).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.ignored, 1);
        assert!(report.is_success(ReportPolicy::RootsOnly));
        assert!(!report.is_success(ReportPolicy::Strict));
    }

    #[tokio::test]
    async fn test_unclosed_connection_fails_root_with_leak() {
        let (_, db, runner) = setup();
        let err = runner
            .run_test(StepDefinition::new("forgets to close", move |_t| async move {
                db.connect().await?;
                Ok(())
            }))
            .await
            .unwrap_err();

        let info = crate::models::ErrorInfo::from(&err);
        assert_eq!(info.kind, ErrorKind::Leak);
        assert_eq!(info.leaks[0].details, vec!["database connection"]);
    }
}
