use super::{Connection, Query};
use crate::result::QueryResult;
use crate::transaction::TransactionSession;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Connection decorator that makes transactions nestable
///
/// Implements [`Connection`] itself and forwards to the wrapped connection
/// through its [`TransactionSession`]: BEGIN/COMMIT/ROLLBACK are rewritten
/// into savepoint statements when a transaction is already open.
///
/// Created with [`TransactionSession::wrap`]. The session only keeps a weak
/// reference, so dropping the wrapper drops the connection.
pub struct NestedConnection<C: Connection> {
    inner: Arc<Mutex<C>>,
    session: TransactionSession<C>,
}

impl<C: Connection> NestedConnection<C> {
    pub(crate) fn new(inner: Arc<Mutex<C>>, session: TransactionSession<C>) -> Self {
        Self { inner, session }
    }

    /// Establish the wrapped connection
    pub async fn connect(&mut self) -> Result<(), C::Error> {
        self.startup(false).await
    }

    /// Re-establish the wrapped connection
    pub async fn reconnect(&mut self) -> Result<(), C::Error> {
        self.startup(true).await
    }

    /// Execute a statement returning positional rows
    pub async fn execute(&mut self, sql: &str) -> Result<QueryResult, C::Error> {
        self.query(&mut Query::array(sql)).await
    }

    pub async fn query_array(&mut self, sql: &str) -> Result<QueryResult, C::Error> {
        self.query(&mut Query::array(sql)).await
    }

    pub async fn query_object(&mut self, sql: &str) -> Result<QueryResult, C::Error> {
        self.query(&mut Query::object(sql)).await
    }

    pub fn session(&self) -> &TransactionSession<C> {
        &self.session
    }

    /// Direct access to the wrapped connection, bypassing interception
    pub async fn inner(&self) -> MutexGuard<'_, C> {
        self.inner.lock().await
    }
}

#[async_trait]
impl<C: Connection> Connection for NestedConnection<C> {
    type Error = C::Error;

    async fn startup(&mut self, is_reconnection: bool) -> Result<(), Self::Error> {
        self.session.track(&self.inner);
        let mut connection = self.inner.lock().await;
        connection.startup(is_reconnection).await
    }

    async fn query(&mut self, query: &mut Query) -> Result<QueryResult, Self::Error> {
        let mut connection = self.inner.lock().await;
        self.session.execute(&mut *connection, query).await
    }
}

impl<C: Connection> std::fmt::Debug for NestedConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedConnection")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
