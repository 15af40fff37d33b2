// ============================================================================
// In-memory backend
// ============================================================================
//
// A small SQL database that, like PostgreSQL, supports one transaction
// level plus savepoints. All connections of a database share the same
// transaction scope, which is how the test harness treats its direct and
// pooled clients. Every statement that reaches the database is logged so
// tests can check exactly what was sent.
//
// ============================================================================

mod catalog;
pub mod connection;
mod parser;

pub use connection::MemoryConnection;

use crate::core::{DbError, Result, Value};
use crate::result::{QueryResult, ResultType};
use catalog::Catalog;
use parser::{Projection, SqlParserAdapter, Statement};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Open transaction: the catalog as it was at BEGIN plus named savepoints
struct TransactionScope {
    snapshot: Catalog,
    savepoints: Vec<(String, Catalog)>,
}

struct DatabaseState {
    catalog: Catalog,
    transaction: Option<TransactionScope>,
    log: VecDeque<String>,
}

/// In-memory database meant for test suites
///
/// The statement log keeps the most recent [`DEFAULT_LOG_LIMIT`] statements
/// unless another limit is set with [`with_log_limit`](Self::with_log_limit).
pub struct MemoryDatabase {
    parser: SqlParserAdapter,
    state: RwLock<DatabaseState>,
    next_connection_id: AtomicU64,
    log_limit: usize,
}

/// Statements kept by [`MemoryDatabase::new`]
pub const DEFAULT_LOG_LIMIT: usize = 10_000;

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_log_limit(DEFAULT_LOG_LIMIT)
    }

    /// Keep at most `limit` statements in the log, dropping the oldest
    pub fn with_log_limit(limit: usize) -> Self {
        Self {
            parser: SqlParserAdapter::new(),
            state: RwLock::new(DatabaseState {
                catalog: Catalog::new(),
                transaction: None,
                log: VecDeque::new(),
            }),
            next_connection_id: AtomicU64::new(1),
            log_limit: limit,
        }
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Execute SQL, returning positional rows
    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.execute_as(sql, ResultType::Array).await
    }

    pub(crate) async fn execute_as(&self, sql: &str, result_type: ResultType) -> Result<QueryResult> {
        let mut state = self.state.write().await;
        if self.log_limit > 0 {
            if state.log.len() == self.log_limit {
                state.log.pop_front();
            }
            state.log.push_back(sql.to_string());
        }

        let mut statements = self.parser.parse(sql)?;
        if statements.len() > 1 {
            return Err(DbError::UnsupportedOperation(format!(
                "Expected a single statement, got {}",
                statements.len()
            )));
        }
        let Some(statement) = statements.pop() else {
            return Err(DbError::ParseError("No statement found".into()));
        };

        let command = statement.command();
        let result = match statement {
            Statement::Begin => state.begin(),
            Statement::Commit => state.commit(),
            Statement::Rollback => state.rollback(),
            Statement::Savepoint(name) => state.savepoint(name),
            Statement::ReleaseSavepoint(name) => state.release_savepoint(&name),
            Statement::RollbackToSavepoint(name) => state.rollback_to_savepoint(&name),
            Statement::CreateTable {
                table_name,
                columns,
                if_not_exists,
            } => state
                .catalog
                .create_table(&table_name, columns, if_not_exists)
                .map(|_| QueryResult::empty(command)),
            Statement::DropTable {
                table_name,
                if_exists,
            } => state
                .catalog
                .drop_table(&table_name, if_exists)
                .map(|_| QueryResult::empty(command)),
            Statement::Insert {
                table_name,
                columns,
                rows,
            } => state
                .catalog
                .insert(&table_name, columns.as_deref(), rows)
                .map(|n| QueryResult::affected(command, n as u64)),
            Statement::Delete { table_name } => state
                .catalog
                .delete_all(&table_name)
                .map(|n| QueryResult::affected(command, n as u64)),
            Statement::Select {
                table_name,
                projection,
            } => state.select(&table_name, projection),
        }?;

        Ok(result.with_result_type(result_type))
    }

    /// Whether a top-level transaction is open
    pub async fn in_transaction(&self) -> bool {
        self.state.read().await.transaction.is_some()
    }

    /// Names of the savepoints currently defined, oldest first
    pub async fn savepoints(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .transaction
            .as_ref()
            .map(|scope| scope.savepoints.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Statements that reached the database, oldest first
    pub async fn statement_log(&self) -> Vec<String> {
        self.state.read().await.log.iter().cloned().collect()
    }

    pub async fn clear_statement_log(&self) {
        self.state.write().await.log.clear();
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.state.read().await.catalog.table_names()
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseState {
    fn scope_mut(&mut self, statement: &str) -> Result<&mut TransactionScope> {
        self.transaction.as_mut().ok_or_else(|| {
            DbError::ExecutionError(format!(
                "{} can only be used in transaction blocks",
                statement
            ))
        })
    }

    fn begin(&mut self) -> Result<QueryResult> {
        if self.transaction.is_some() {
            warn!("there is already a transaction in progress");
        } else {
            self.transaction = Some(TransactionScope {
                snapshot: self.catalog.clone(),
                savepoints: Vec::new(),
            });
        }
        Ok(QueryResult::empty("BEGIN"))
    }

    fn commit(&mut self) -> Result<QueryResult> {
        if self.transaction.take().is_none() {
            warn!("there is no transaction in progress");
        }
        Ok(QueryResult::empty("COMMIT"))
    }

    fn rollback(&mut self) -> Result<QueryResult> {
        match self.transaction.take() {
            Some(scope) => self.catalog = scope.snapshot,
            None => warn!("there is no transaction in progress"),
        }
        Ok(QueryResult::empty("ROLLBACK"))
    }

    fn savepoint(&mut self, name: String) -> Result<QueryResult> {
        let catalog = self.catalog.clone();
        let scope = self.scope_mut("SAVEPOINT")?;
        debug!(savepoint = name.as_str(), "savepoint defined");
        scope.savepoints.push((name, catalog));
        Ok(QueryResult::empty("SAVEPOINT"))
    }

    fn release_savepoint(&mut self, name: &str) -> Result<QueryResult> {
        let scope = self.scope_mut("RELEASE SAVEPOINT")?;
        let position = find_savepoint(scope, name)?;
        scope.savepoints.truncate(position);
        Ok(QueryResult::empty("RELEASE"))
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<QueryResult> {
        let scope = self.scope_mut("ROLLBACK TO SAVEPOINT")?;
        let position = find_savepoint(scope, name)?;
        scope.savepoints.truncate(position + 1);
        let restored = scope.savepoints[position].1.clone();
        self.catalog = restored;
        Ok(QueryResult::empty("ROLLBACK"))
    }

    fn select(&self, table_name: &str, projection: Projection) -> Result<QueryResult> {
        let table = self.catalog.table(table_name)?;

        match projection {
            Projection::Count => Ok(QueryResult::new(
                "SELECT",
                vec!["count".to_string()],
                vec![vec![Value::Integer(table.rows.len() as i64)]],
            )),
            Projection::All => Ok(QueryResult::new(
                "SELECT",
                table.columns.clone(),
                table.rows.iter().cloned().collect(),
            )),
            Projection::Columns(columns) => {
                let indexes = columns
                    .iter()
                    .map(|column| {
                        table.columns.iter().position(|c| c == column).ok_or_else(|| {
                            DbError::ColumnNotFound(column.clone(), table_name.to_string())
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let rows = table
                    .rows
                    .iter()
                    .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                    .collect();

                Ok(QueryResult::new("SELECT", columns, rows))
            }
        }
    }
}

/// Most recent savepoint with this name
fn find_savepoint(scope: &TransactionScope, name: &str) -> Result<usize> {
    scope
        .savepoints
        .iter()
        .rposition(|(n, _)| n == name)
        .ok_or_else(|| DbError::SavepointNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(db: &MemoryDatabase) -> i64 {
        db.execute("SELECT COUNT(*) FROM sample")
            .await
            .unwrap()
            .scalar()
            .and_then(Value::as_i64)
            .unwrap()
    }

    async fn sample_db() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.execute("CREATE TABLE sample (\"text\" text)").await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_rollback_restores_rows() {
        let db = sample_db().await;

        db.execute("BEGIN").await.unwrap();
        db.execute("INSERT INTO sample VALUES ('value')").await.unwrap();
        assert_eq!(count(&db).await, 1);

        db.execute("ROLLBACK").await.unwrap();
        assert_eq!(count(&db).await, 0);
        assert!(!db.in_transaction().await);
    }

    #[tokio::test]
    async fn test_commit_keeps_rows() {
        let db = sample_db().await;

        db.execute("START TRANSACTION").await.unwrap();
        db.execute("INSERT INTO sample VALUES ('value')").await.unwrap();
        db.execute("COMMIT").await.unwrap();

        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_to_savepoint() {
        let db = sample_db().await;

        db.execute("BEGIN").await.unwrap();
        db.execute("INSERT INTO sample VALUES ('outer')").await.unwrap();
        db.execute("SAVEPOINT \"1\"").await.unwrap();
        db.execute("INSERT INTO sample VALUES ('inner')").await.unwrap();
        assert_eq!(count(&db).await, 2);

        db.execute("ROLLBACK TO SAVEPOINT \"1\"").await.unwrap();
        assert_eq!(count(&db).await, 1);
        assert_eq!(db.savepoints().await, vec!["1".to_string()]);

        db.execute("RELEASE SAVEPOINT \"1\"").await.unwrap();
        assert!(db.savepoints().await.is_empty());

        db.execute("ROLLBACK").await.unwrap();
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_release_keeps_changes() {
        let db = sample_db().await;

        db.execute("BEGIN").await.unwrap();
        db.execute("SAVEPOINT \"1\"").await.unwrap();
        db.execute("SAVEPOINT \"2\"").await.unwrap();
        db.execute("INSERT INTO sample VALUES ('kept')").await.unwrap();
        db.execute("RELEASE SAVEPOINT \"1\"").await.unwrap();

        assert!(db.savepoints().await.is_empty());
        assert_eq!(count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_savepoint_errors() {
        let db = sample_db().await;

        assert!(matches!(
            db.execute("SAVEPOINT \"1\"").await,
            Err(DbError::ExecutionError(_))
        ));

        db.execute("BEGIN").await.unwrap();
        assert!(matches!(
            db.execute("RELEASE SAVEPOINT \"9\"").await,
            Err(DbError::SavepointNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_redundant_transaction_control_is_tolerated() {
        let db = sample_db().await;

        db.execute("COMMIT").await.unwrap();
        db.execute("ROLLBACK").await.unwrap();
        db.execute("BEGIN").await.unwrap();
        db.execute("BEGIN").await.unwrap();
        assert!(db.in_transaction().await);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let db = MemoryDatabase::new();
        assert!(matches!(
            db.execute("SELECT * FROM nonExistingTable").await,
            Err(DbError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_select_shapes() {
        let db = sample_db().await;
        db.execute("INSERT INTO sample (\"text\") VALUES ('value')").await.unwrap();

        let all = db.execute_as("SELECT * FROM sample", ResultType::Object).await.unwrap();
        assert_eq!(all.result_type, ResultType::Object);
        assert_eq!(all.objects()[0]["text"], serde_json::json!("value"));

        let cols = db.execute("SELECT \"text\" FROM sample").await.unwrap();
        assert_eq!(cols.rows, vec![vec![Value::from("value")]]);
    }

    #[tokio::test]
    async fn test_statement_log() {
        let db = sample_db().await;
        db.execute("BEGIN").await.unwrap();
        let _ = db.execute("SELECT * FROM missing").await;

        assert_eq!(
            db.statement_log().await,
            vec![
                "CREATE TABLE sample (\"text\" text)",
                "BEGIN",
                "SELECT * FROM missing",
            ]
        );

        db.clear_statement_log().await;
        assert!(db.statement_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_statement_log_limit() {
        let db = MemoryDatabase::with_log_limit(2);
        db.execute("CREATE TABLE sample (\"text\" text)").await.unwrap();
        db.execute("BEGIN").await.unwrap();
        db.execute("ROLLBACK").await.unwrap();

        assert_eq!(db.statement_log().await, vec!["BEGIN", "ROLLBACK"]);

        let silent = MemoryDatabase::with_log_limit(0);
        silent.execute("BEGIN").await.unwrap();
        assert!(silent.statement_log().await.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_statements_are_rejected() {
        let db = sample_db().await;

        let result = db
            .execute("INSERT INTO sample VALUES ('a'); INSERT INTO sample VALUES ('b')")
            .await;
        assert!(matches!(result, Err(DbError::UnsupportedOperation(_))));

        let result = db.execute("BEGIN; INSERT INTO sample VALUES ('a')").await;
        assert!(matches!(result, Err(DbError::UnsupportedOperation(_))));

        assert_eq!(count(&db).await, 0);
        assert!(!db.in_transaction().await);
    }
}
