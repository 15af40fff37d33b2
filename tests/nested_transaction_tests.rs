/// Nested transaction tests
///
/// Runs the transactional test-suite lifecycle against the in-memory backend:
/// a direct client and a pooled client share one session.
/// Run with: cargo test --test nested_transaction_tests

use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use transactional_tests::{
    Connection, DbError, DepthUpdate, MemoryConnection, MemoryDatabase, NestedConnection,
    SessionConfig, TransactionSession, TransactionState, TransactionalTest, Value,
};

const INSERT_SQL: &str = "INSERT INTO sample (\"text\") VALUES ('value')";

struct Fixture {
    db: Arc<MemoryDatabase>,
    session: TransactionSession<MemoryConnection>,
    harness: TransactionalTest<MemoryConnection>,
    client: NestedConnection<MemoryConnection>,
    pool_client: NestedConnection<MemoryConnection>,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_session(TransactionSession::new()).await
    }

    async fn with_session(session: TransactionSession<MemoryConnection>) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        let mut client = session.wrap(MemoryConnection::new(Arc::clone(&db)));
        let mut pool_client = session.wrap(MemoryConnection::new(Arc::clone(&db)));

        client.connect().await.unwrap();
        pool_client.connect().await.unwrap();
        client.execute("CREATE TABLE sample (\"text\" text)").await.unwrap();
        db.clear_statement_log().await;

        Self {
            harness: TransactionalTest::new(session.clone()),
            db,
            session,
            client,
            pool_client,
        }
    }

    async fn count(&mut self) -> i64 {
        let result = self
            .client
            .query_object("SELECT COUNT(*) FROM sample")
            .await
            .unwrap();
        result.scalar().and_then(Value::as_i64).unwrap()
    }

    async fn log(&self) -> Vec<String> {
        self.db.statement_log().await
    }
}

#[tokio::test]
async fn test_leaves_db_empty_after_test() {
    let mut fx = Fixture::new().await;

    fx.harness.before_each();
    assert_eq!(fx.count().await, 0);

    let (a, b) = futures::future::try_join(fx.client.execute(INSERT_SQL), fx.pool_client.execute(INSERT_SQL))
        .await
        .unwrap();
    assert_eq!(a.rows_affected, 1);
    assert_eq!(b.rows_affected, 1);
    assert_eq!(fx.count().await, 2);

    fx.harness.after_each().await.unwrap();
    assert_eq!(fx.session.state(), TransactionState::Idle);
    assert_eq!(fx.count().await, 0);
}

#[tokio::test]
async fn test_implicit_begin_then_rollback() {
    let mut fx = Fixture::new().await;

    fx.session.start_transaction();
    fx.client.execute(INSERT_SQL).await.unwrap();
    assert_eq!(fx.session.depth(), 1);
    assert!(fx.db.in_transaction().await);

    fx.session.rollback_transaction().await.unwrap();
    assert_eq!(fx.session.depth(), 0);
    assert_eq!(fx.count().await, 0);

    assert_eq!(
        fx.log().await,
        vec![
            "BEGIN",
            INSERT_SQL,
            "ROLLBACK",
            "SELECT COUNT(*) FROM sample",
        ]
    );
}

#[tokio::test]
async fn test_group_setup_survives_each_test() {
    let mut fx = Fixture::new().await;

    // group setup
    fx.harness.before_all();
    fx.client.execute(INSERT_SQL).await.unwrap();

    // one test of the group
    fx.harness.before_each();
    assert_eq!(fx.count().await, 1);
    assert_eq!(fx.session.state(), TransactionState::Nested(2));
    fx.pool_client.execute(INSERT_SQL).await.unwrap();
    assert_eq!(fx.count().await, 2);
    fx.harness.after_each().await.unwrap();

    assert_eq!(fx.count().await, 1);

    // group teardown
    fx.harness.after_all().await.unwrap();
    assert_eq!(fx.count().await, 0);

    let log = fx.log().await;
    assert_eq!(log[0], "BEGIN");
    assert_eq!(log[2], "SAVEPOINT \"1\"");
    assert!(log.contains(&"ROLLBACK TO SAVEPOINT \"1\"".to_string()));
    assert_eq!(log[log.len() - 2], "ROLLBACK");
}

#[tokio::test]
async fn test_nested_transactions_case_insensitive() {
    let mut fx = Fixture::new().await;

    fx.harness.before_each();
    fx.client.execute("STaRT TRANSaCTION").await.unwrap();
    assert_eq!(fx.session.depth(), 2);
    fx.client.execute("COmMIT").await.unwrap();
    assert_eq!(fx.session.depth(), 1);
    fx.client.execute("BeGiN").await.unwrap();
    fx.client.execute("ROLlBaCK").await.unwrap();
    fx.harness.after_each().await.unwrap();

    assert_eq!(fx.session.depth(), 0);
    assert_eq!(
        fx.log().await,
        vec![
            "BEGIN",
            "SAVEPOINT \"1\"",
            "RELEASE SAVEPOINT \"1\"",
            "SAVEPOINT \"1\"",
            "ROLLBACK TO SAVEPOINT \"1\"",
            "ROLLBACK",
        ]
    );
}

#[tokio::test]
async fn test_nested_commit_and_rollback_data() -> anyhow::Result<()> {
    let mut fx = Fixture::new().await;

    fx.client.execute("BEGIN").await?;
    fx.client.execute(INSERT_SQL).await?;

    fx.client.execute("BEGIN").await?;
    fx.client.execute(INSERT_SQL).await?;
    fx.client.execute("COMMIT").await?;
    assert_eq!(fx.count().await, 2);

    fx.client.execute("BEGIN").await?;
    fx.client.execute(INSERT_SQL).await?;
    fx.client.execute("ROLLBACK").await?;
    assert_eq!(fx.count().await, 2);

    fx.client.execute("ROLLBACK").await?;
    assert_eq!(fx.count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_errors_in_pool_client_propagate() {
    let mut fx = Fixture::new().await;

    let pool_client = &mut fx.pool_client;
    let result = fx
        .harness
        .isolated(|| async move { pool_client.execute("SELECT * FROM nonExistingTable").await })
        .await;

    let err = assert_err!(result);
    assert!(matches!(err, DbError::TableNotFound(_)));
    assert_eq!(fx.session.depth(), 0);
    assert!(!fx.db.in_transaction().await);
}

#[tokio::test]
async fn test_isolated_returns_test_value() {
    let mut fx = Fixture::new().await;

    let client = &mut fx.client;
    let inserted = fx
        .harness
        .isolated(|| async move {
            let result = client.execute(INSERT_SQL).await?;
            Ok::<_, DbError>(result.rows_affected)
        })
        .await;

    assert_eq!(assert_ok!(inserted), 1);
    assert_eq!(fx.count().await, 0);
}

#[tokio::test]
async fn test_isolated_without_statements_leaves_no_transaction() -> anyhow::Result<()> {
    let mut fx = Fixture::new().await;

    fx.harness.isolated(|| async { Ok(()) }).await?;
    assert!(!fx.session.is_begin_deferred());

    fx.client.execute(INSERT_SQL).await?;
    assert_eq!(fx.session.depth(), 0);
    assert!(!fx.db.in_transaction().await);
    assert_eq!(fx.log().await, vec![INSERT_SQL]);
    Ok(())
}

#[tokio::test]
async fn test_isolated_without_statements_keeps_outer_level() -> anyhow::Result<()> {
    let mut fx = Fixture::new().await;

    fx.harness.before_all();
    fx.client.execute(INSERT_SQL).await?;

    fx.harness.isolated(|| async { Ok(()) }).await?;
    assert_eq!(fx.session.depth(), 1);
    assert_eq!(fx.count().await, 1);

    fx.harness.after_all().await?;
    assert_eq!(fx.count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_commit_outside_transaction_is_rejected() {
    let mut fx = Fixture::new().await;

    for sql in ["COMMIT", "rollback", "  Commit work  "] {
        let err = assert_err!(fx.client.execute(sql).await);
        assert!(err.is_transaction_state(), "{sql} should be rejected");
    }

    assert_eq!(fx.session.depth(), 0);
    assert!(fx.log().await.is_empty());
}

#[tokio::test]
async fn test_rollback_transaction_when_idle_sends_nothing() {
    let fx = Fixture::new().await;

    assert_ok!(fx.session.rollback_transaction().await);
    assert_ok!(fx.harness.after_all().await);
    assert!(fx.log().await.is_empty());
}

#[tokio::test]
async fn test_rollback_transaction_sends_exactly_one_statement() {
    let mut fx = Fixture::new().await;

    fx.client.execute("BEGIN").await.unwrap();
    fx.pool_client.execute("BEGIN").await.unwrap();
    fx.client.execute("BEGIN").await.unwrap();
    fx.db.clear_statement_log().await;

    for expected_depth in [2, 1, 0] {
        fx.session.rollback_transaction().await.unwrap();
        assert_eq!(fx.session.depth(), expected_depth);
    }

    assert_eq!(
        fx.log().await,
        vec![
            "ROLLBACK TO SAVEPOINT \"2\"",
            "ROLLBACK TO SAVEPOINT \"1\"",
            "ROLLBACK",
        ]
    );
}

#[tokio::test]
async fn test_depth_matches_unmatched_begins() {
    let mut fx = Fixture::new().await;

    let script = [
        "BEGIN", "BEGIN", "COMMIT", "BEGIN", "BEGIN", "ROLLBACK", "BEGIN", "COMMIT", "COMMIT",
        "BEGIN", "ROLLBACK", "ROLLBACK",
    ];

    let mut open = 0usize;
    for sql in script {
        match sql {
            "BEGIN" => open += 1,
            _ => open -= 1,
        }
        fx.client.execute(sql).await.unwrap();

        assert_eq!(fx.session.depth(), open, "after {sql}");
        assert_eq!(fx.db.in_transaction().await, open > 0);
        if open > 1 {
            let name = format!("{}", open - 1);
            assert!(fx.db.savepoints().await.contains(&name));
        }
    }

    assert_eq!(fx.session.state(), TransactionState::Idle);
}

#[tokio::test]
async fn test_concurrent_connections_share_the_scope() {
    let fx = Fixture::new().await;
    let Fixture { db, session, mut client, .. } = fx;

    session.start_transaction();
    client.execute("SELECT COUNT(*) FROM sample").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let mut conn = session.wrap(MemoryConnection::new(Arc::clone(&db)));
        handles.push(tokio::spawn(async move {
            conn.connect().await?;
            conn.execute(INSERT_SQL).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let count = client.execute("SELECT COUNT(*) FROM sample").await.unwrap();
    assert_eq!(count.scalar(), Some(&Value::Integer(4)));

    session.rollback_transaction().await.unwrap();
    let count = client.execute("SELECT COUNT(*) FROM sample").await.unwrap();
    assert_eq!(count.scalar(), Some(&Value::Integer(0)));
}

#[tokio::test]
async fn test_reconnect_keeps_tracking() {
    let mut fx = Fixture::new().await;

    fx.client.execute("BEGIN").await.unwrap();
    fx.client.inner().await.close();
    fx.client.reconnect().await.unwrap();

    fx.session.rollback_transaction().await.unwrap();
    assert_eq!(fx.session.depth(), 0);
    assert!(!fx.db.in_transaction().await);
}

#[tokio::test]
async fn test_uninstall_passes_statements_through() {
    let mut fx = Fixture::new().await;

    fx.client.execute("BEGIN").await.unwrap();
    fx.session.uninstall();
    assert!(!fx.session.has_active_connection());

    fx.client.execute("BEGIN").await.unwrap();
    fx.client.execute("BEGIN").await.unwrap();
    fx.client.execute("ROLLBACK").await.unwrap();
    assert!(fx.client.execute("ROLLBACK").await.is_ok());

    assert_eq!(fx.log().await, vec!["BEGIN", "BEGIN", "BEGIN", "ROLLBACK", "ROLLBACK"]);

    assert!(fx.session.install());
    fx.client.execute("BEGIN").await.unwrap();
    fx.client.execute("BEGIN").await.unwrap();
    assert_eq!(fx.log().await.last().map(String::as_str), Some("SAVEPOINT \"1\""));
}

#[tokio::test]
async fn test_failed_rewrite_desynchronizes_optimistic_depth() {
    let mut fx = Fixture::new().await;

    fx.client.execute("BEGIN").await.unwrap();
    fx.client.execute("BEGIN").await.unwrap();
    fx.client
        .inner()
        .await
        .query(&mut "RELEASE SAVEPOINT \"1\"".into())
        .await
        .unwrap();

    let err = fx.client.execute("COMMIT").await.unwrap_err();
    assert!(matches!(err, DbError::SavepointNotFound(_)));
    assert_eq!(fx.session.depth(), 1);
}

#[tokio::test]
async fn test_failed_rewrite_keeps_depth_after_success_mode() {
    let config = SessionConfig::new().depth_update(DepthUpdate::AfterSuccess);
    let mut fx = Fixture::with_session(TransactionSession::with_config(config).unwrap()).await;

    fx.client.execute("BEGIN").await.unwrap();
    fx.client.execute("BEGIN").await.unwrap();
    fx.client
        .inner()
        .await
        .query(&mut "RELEASE SAVEPOINT \"1\"".into())
        .await
        .unwrap();

    let err = fx.client.execute("COMMIT").await.unwrap_err();
    assert!(matches!(err, DbError::SavepointNotFound(_)));
    assert_eq!(fx.session.depth(), 2);
}
