//! Per-test fixture
//!
//! State shared by one test's hooks and body. A fresh value is built for every
//! test execution.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared handle to a test's fixture value
pub struct Fixture<F> {
    inner: Arc<Mutex<F>>,
}

impl<F> Fixture<F> {
    pub fn new(value: F) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, F> {
        self.inner.lock().await
    }

    /// `None` while a hook or the body holds the lock
    pub fn try_lock(&self) -> Option<MutexGuard<'_, F>> {
        self.inner.try_lock().ok()
    }
}

impl<F> Clone for Fixture<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: Default> Default for Fixture<F> {
    fn default() -> Self {
        Self::new(F::default())
    }
}
