use super::MemoryDatabase;
use crate::connection::{Connection, Query};
use crate::core::{DbError, Result};
use crate::result::QueryResult;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Created,
    Active,
    Closed,
}

/// Connection to a [`MemoryDatabase`]
///
/// Has to be established with `startup` before it accepts statements.
pub struct MemoryConnection {
    id: u64,
    db: Arc<MemoryDatabase>,
    state: ConnectionState,
}

impl MemoryConnection {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self {
            id: db.next_connection_id(),
            db,
            state: ConnectionState::Created,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }

    /// Close the connection. It can be brought back with a reconnecting `startup`.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Error = DbError;

    async fn startup(&mut self, is_reconnection: bool) -> Result<()> {
        match (self.state, is_reconnection) {
            (ConnectionState::Active, false) => Err(DbError::ConnectionError(
                "Connection already established".into(),
            )),
            (ConnectionState::Closed, false) => Err(DbError::ConnectionError(
                "Connection is closed, reconnect instead".into(),
            )),
            _ => {
                self.state = ConnectionState::Active;
                Ok(())
            }
        }
    }

    async fn query(&mut self, query: &mut Query) -> Result<QueryResult> {
        if self.state != ConnectionState::Active {
            return Err(DbError::ConnectionError("Connection is not established".into()));
        }

        self.db.execute_as(query.text(), query.result_type()).await
    }
}
