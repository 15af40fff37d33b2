use super::{ConnectionTracking, DepthUpdate, SessionConfig, StatementKind, TransactionState, Transition};
use crate::connection::{Connection, NestedConnection, Query};
use crate::core::{DbError, Result};
use crate::result::QueryResult;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Shared handle to a wrapped connection
pub(crate) type SharedConnection<C> = Arc<AsyncMutex<C>>;

/// Nested transaction session
///
/// Holds the nesting depth, the deferred-begin flag and a weak reference to
/// the connection used for forced rollbacks. Every [`NestedConnection`]
/// created with [`wrap`](Self::wrap) shares this state, so a test's direct
/// client and a pooled client behave as one transaction scope.
///
/// Cloning the session clones the handle, not the state.
///
/// # Examples
///
/// ```ignore
/// let session = TransactionSession::new();
/// let mut client = session.wrap(MemoryConnection::new(Arc::clone(&db)));
/// client.connect().await?;
///
/// session.start_transaction();
/// client.execute("INSERT INTO sample (\"text\") VALUES ('value')").await?; // BEGIN sent first
/// session.rollback_transaction().await?;                                  // row gone
/// ```
pub struct TransactionSession<C: Connection> {
    shared: Arc<Shared<C>>,
}

struct Shared<C: Connection> {
    config: SessionConfig,
    state: Mutex<SessionState<C>>,
}

struct SessionState<C: Connection> {
    installed: bool,
    depth: usize,
    begin_deferred: bool,
    active: Option<Weak<AsyncMutex<C>>>,
}

impl<C: Connection> SessionState<C> {
    fn reset(&mut self) {
        self.depth = 0;
        self.begin_deferred = false;
        self.active = None;
    }

    fn has_live_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl<C: Connection> TransactionSession<C> {
    /// Create an installed session with the default configuration
    pub fn new() -> Self {
        Self::build(SessionConfig::default())
    }

    /// Create an installed session with a custom configuration
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        config.validate().map_err(DbError::ConfigError)?;
        Ok(Self::build(config))
    }

    fn build(config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(SessionState {
                    installed: true,
                    depth: 0,
                    begin_deferred: false,
                    active: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState<C>> {
        // No invariant spans a panic: every critical section is a plain field update.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Turn interception back on.
    ///
    /// Returns `false` if the session was already installed.
    pub fn install(&self) -> bool {
        let mut state = self.lock();
        if state.installed {
            return false;
        }
        state.installed = true;
        debug!("transaction session installed");
        true
    }

    /// Turn interception off and forget all nesting state.
    ///
    /// Wrapped connections keep working but forward statements unchanged.
    pub fn uninstall(&self) {
        let mut state = self.lock();
        state.installed = false;
        state.reset();
        debug!("transaction session uninstalled");
    }

    pub fn is_installed(&self) -> bool {
        self.lock().installed
    }

    /// Make the next statement on any wrapped connection open a transaction
    /// level first. No I/O happens here.
    pub fn start_transaction(&self) {
        self.lock().begin_deferred = true;
    }

    /// Undo one nesting level on the tracked connection.
    ///
    /// Sends the configured rollback statement through the interception
    /// path, so it becomes `ROLLBACK TO SAVEPOINT` when nested. Does nothing
    /// when no transaction is open.
    pub async fn rollback_transaction(&self) -> std::result::Result<(), C::Error> {
        let target = {
            let state = self.lock();
            if state.depth == 0 {
                return Ok(());
            }
            state.active.as_ref().and_then(Weak::upgrade)
        };

        let Some(connection) = target else {
            warn!(
                depth = self.depth(),
                "rollback requested but the tracked connection is gone"
            );
            return Ok(());
        };

        let mut connection = connection.lock().await;
        let mut query = Query::array(self.shared.config.rollback_statement.as_str());
        self.execute(&mut *connection, &mut query).await?;
        Ok(())
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.lock().depth
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_depth(self.depth())
    }

    pub fn is_begin_deferred(&self) -> bool {
        self.lock().begin_deferred
    }

    /// Drop a deferred begin no statement has consumed yet.
    ///
    /// Returns whether one was pending.
    pub(crate) fn cancel_deferred_begin(&self) -> bool {
        std::mem::take(&mut self.lock().begin_deferred)
    }

    /// Whether a live connection is tracked for forced rollbacks
    pub fn has_active_connection(&self) -> bool {
        self.lock().has_live_active()
    }

    /// Wrap a connection so its statements go through this session
    pub fn wrap(&self, connection: C) -> NestedConnection<C> {
        NestedConnection::new(Arc::new(AsyncMutex::new(connection)), self.clone())
    }

    /// Record an establish call on `connection`
    pub(crate) fn track(&self, connection: &SharedConnection<C>) {
        let mut state = self.lock();
        if !state.installed {
            return;
        }

        let replace = match self.shared.config.tracking {
            ConnectionTracking::FirstEstablished => !state.has_live_active(),
            ConnectionTracking::LatestEstablished => true,
        };

        if replace {
            state.active = Some(Arc::downgrade(connection));
            debug!(tracking = ?self.shared.config.tracking, "tracking connection for rollback");
        }
    }

    /// Intercepted execute path
    pub(crate) async fn execute(
        &self,
        connection: &mut C,
        query: &mut Query,
    ) -> std::result::Result<QueryResult, C::Error> {
        if self.take_deferred_begin() {
            let mut begin = Query::array(self.shared.config.begin_statement.as_str());
            debug!(depth = self.depth(), "opening deferred transaction level");
            self.dispatch(connection, &mut begin).await?;
        }

        self.dispatch(connection, query).await
    }

    fn take_deferred_begin(&self) -> bool {
        let mut state = self.lock();
        state.installed && std::mem::take(&mut state.begin_deferred)
    }

    async fn dispatch(
        &self,
        connection: &mut C,
        query: &mut Query,
    ) -> std::result::Result<QueryResult, C::Error> {
        let kind = StatementKind::classify(query.text());
        let depth_update = self.shared.config.depth_update;

        let transition = {
            let mut state = self.lock();
            if !state.installed {
                None
            } else {
                let transition = Transition::plan(state.depth, kind)?;
                if depth_update == DepthUpdate::BeforeExecute {
                    state.depth = transition.depth_after;
                }
                Some(transition)
            }
        };

        let Some(transition) = transition else {
            return connection.query(query).await;
        };

        if let Some(rewrite) = transition.rewrite.as_deref() {
            debug!(
                original = query.text(),
                rewrite,
                depth = transition.depth_before,
                "rewriting transaction statement"
            );
            query.set_text(rewrite);
        }

        let result = connection.query(query).await;

        if depth_update == DepthUpdate::AfterSuccess && result.is_ok() && kind.is_transaction_control() {
            let mut state = self.lock();
            if state.installed {
                state.depth = transition.depth_after;
            }
        }

        result
    }
}

impl<C: Connection> Clone for TransactionSession<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connection> Default for TransactionSession<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> std::fmt::Debug for TransactionSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TransactionSession")
            .field("installed", &state.installed)
            .field("depth", &state.depth)
            .field("begin_deferred", &state.begin_deferred)
            .field("tracking", &state.has_live_active())
            .finish()
    }
}
