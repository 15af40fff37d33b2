// ============================================================================
// transactional-tests Library
// ============================================================================
//
// Nested transactions for test suites on databases that only support one
// transaction level per connection. Wrapped connections turn BEGIN, COMMIT
// and ROLLBACK into SAVEPOINT, RELEASE SAVEPOINT and ROLLBACK TO SAVEPOINT
// whenever a transaction is already open, so every test can run inside its
// own transaction and be rolled back afterwards.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod harness;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod result;
pub mod transaction;

pub use connection::{Connection, NestedConnection, Query, ResultType};
pub use crate::core::{Boundary, DbError, MissingEnvVar, Result, TransactionStateError, Value};
pub use harness::{TransactionalTest, require_env};
pub use memory::{MemoryConnection, MemoryDatabase};
pub use result::QueryResult;
pub use transaction::{
    ConnectionTracking, DepthUpdate, SessionConfig, StatementKind, TransactionSession,
    TransactionState,
};

#[cfg(feature = "postgres")]
pub use postgres::{PgConfig, PgConnection, PgError};
