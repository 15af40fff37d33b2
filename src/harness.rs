//! Setup/teardown hooks for transactional tests
//!
//! Rust test runners have no `beforeEach`/`afterEach`, so the hooks are plain
//! methods; [`TransactionalTest::isolated`] strings them together around a
//! test body.

use crate::connection::Connection;
use crate::core::MissingEnvVar;
use crate::transaction::TransactionSession;
use std::future::Future;

/// Fail with the first variable of `vars` that is not set
pub fn require_env(vars: &[&str]) -> Result<(), MissingEnvVar> {
    match vars.iter().find(|var| std::env::var_os(var).is_none()) {
        Some(missing) => Err(MissingEnvVar(missing.to_string())),
        None => Ok(()),
    }
}

/// Test-suite hooks bound to a transaction session
pub struct TransactionalTest<C: Connection> {
    session: TransactionSession<C>,
}

impl<C: Connection> TransactionalTest<C> {
    pub fn new(session: TransactionSession<C>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &TransactionSession<C> {
        &self.session
    }

    /// Open a transaction level for a whole group of tests
    pub fn before_all(&self) {
        self.session.start_transaction();
    }

    /// Open a transaction level for the next test
    pub fn before_each(&self) {
        self.session.start_transaction();
    }

    /// Undo whatever the test wrote
    pub async fn after_each(&self) -> Result<(), C::Error> {
        self.session.rollback_transaction().await
    }

    /// Undo whatever the group wrote in its setup
    pub async fn after_all(&self) -> Result<(), C::Error> {
        self.session.rollback_transaction().await
    }

    /// Run `test` inside its own transaction level.
    ///
    /// The level is rolled back even if the test fails; the test's own error
    /// wins over a rollback error. A test that sent no statement never opened
    /// its level, so the pending begin is dropped instead of leaking into
    /// whatever runs next.
    pub async fn isolated<F, Fut, T>(&self, test: F) -> Result<T, C::Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, C::Error>>,
    {
        self.before_each();
        let outcome = test().await;
        let rolled_back = if self.session.cancel_deferred_begin() {
            Ok(())
        } else {
            self.after_each().await
        };
        let value = outcome?;
        rolled_back?;
        Ok(value)
    }
}

impl<C: Connection> Clone for TransactionalTest<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}
