use crate::core::Boundary;
use thiserror::Error;

/// COMMIT or ROLLBACK requested while no transaction is open.
///
/// Raised before anything is sent to the database.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Trying to {boundary} outside of transaction")]
pub struct TransactionStateError {
    pub boundary: Boundary,
}

impl TransactionStateError {
    pub fn new(boundary: Boundary) -> Self {
        Self { boundary }
    }
}

/// A required environment variable is not set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing {0} environment variable!")]
pub struct MissingEnvVar(pub String);

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Savepoint \"{0}\" does not exist")]
    SavepointNotFound(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error(transparent)]
    TransactionState(#[from] TransactionStateError),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// True when the error came from the nesting bookkeeping rather than the database
    pub fn is_transaction_state(&self) -> bool {
        matches!(self, Self::TransactionState(_))
    }
}
