pub mod nested;

use crate::core::TransactionStateError;
use crate::result::QueryResult;
use async_trait::async_trait;

pub use crate::result::ResultType;
pub use nested::NestedConnection;

/// Statement sent over a connection
///
/// The text is mutable so an interceptor can rewrite it before it reaches
/// the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    result_type: ResultType,
}

impl Query {
    pub fn new(text: impl Into<String>, result_type: ResultType) -> Self {
        Self {
            text: text.into(),
            result_type,
        }
    }

    /// Query returning positional rows
    pub fn array(text: impl Into<String>) -> Self {
        Self::new(text, ResultType::Array)
    }

    /// Query returning rows keyed by column name
    pub fn object(text: impl Into<String>) -> Self {
        Self::new(text, ResultType::Object)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn result_type(&self) -> ResultType {
        self.result_type
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::array(text)
    }
}

/// Database connection capability
///
/// Anything that can be established and can execute statements. The
/// error type must be able to carry a [`TransactionStateError`] so that a
/// wrapper can report misplaced COMMIT/ROLLBACK through the same channel as
/// driver failures.
///
/// # Examples
///
/// ```ignore
/// conn.startup(false).await?;
/// let result = conn.query(&mut Query::array("SELECT COUNT(*) FROM sample")).await?;
/// ```
#[async_trait]
pub trait Connection: Send + 'static {
    type Error: From<TransactionStateError> + Send;

    /// Establish the connection, or re-establish it after a drop
    async fn startup(&mut self, is_reconnection: bool) -> Result<(), Self::Error>;

    /// Execute a statement
    async fn query(&mut self, query: &mut Query) -> Result<QueryResult, Self::Error>;
}
