//! PostgreSQL backend built on `tokio-postgres`
//!
//! Statements go over the simple-query protocol, so every column comes back
//! as text.

use crate::connection::{Connection, Query};
use crate::core::{MissingEnvVar, TransactionStateError, Value};
use crate::harness::require_env;
use crate::result::QueryResult;
use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error};

/// libpq variables the backend is configured from
pub const PG_ENV_VARS: [&str; 5] = ["PGUSER", "PGPASSWORD", "PGDATABASE", "PGPORT", "PGHOST"];

#[derive(Error, Debug)]
pub enum PgError {
    #[error(transparent)]
    Driver(#[from] tokio_postgres::Error),

    #[error(transparent)]
    MissingEnv(#[from] MissingEnvVar),

    #[error("Invalid PGPORT value '{0}'")]
    InvalidPort(String),

    #[error("Connection is not established")]
    NotConnected,

    #[error(transparent)]
    TransactionState(#[from] TransactionStateError),
}

#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl PgConfig {
    /// Read `PGUSER`, `PGPASSWORD`, `PGDATABASE`, `PGPORT` and `PGHOST`.
    ///
    /// All five are required.
    pub fn from_env() -> Result<Self, PgError> {
        require_env(&PG_ENV_VARS)?;

        let var = |name: &str| std::env::var(name).map_err(|_| MissingEnvVar(name.to_string()));
        let port = var("PGPORT")?;

        Ok(Self {
            host: var("PGHOST")?,
            port: port.parse().map_err(|_| PgError::InvalidPort(port.clone()))?,
            user: var("PGUSER")?,
            password: var("PGPASSWORD")?,
            dbname: var("PGDATABASE")?,
        })
    }

    fn to_driver_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.dbname);
        config
    }
}

/// Single PostgreSQL connection
pub struct PgConnection {
    config: PgConfig,
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

impl PgConnection {
    pub fn new(config: PgConfig) -> Self {
        Self {
            config,
            client: None,
            driver: None,
        }
    }

    pub fn from_env() -> Result<Self, PgError> {
        Ok(Self::new(PgConfig::from_env()?))
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|client| !client.is_closed())
    }

    /// Drop the client and stop the connection task
    pub fn close(&mut self) {
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl Connection for PgConnection {
    type Error = PgError;

    async fn startup(&mut self, is_reconnection: bool) -> Result<(), PgError> {
        if is_reconnection {
            self.close();
        }

        let (client, connection) = self.config.to_driver_config().connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection error");
            }
        });

        debug!(host = self.config.host.as_str(), port = self.config.port, "postgres connection established");
        self.client = Some(client);
        self.driver = Some(driver);
        Ok(())
    }

    async fn query(&mut self, query: &mut Query) -> Result<QueryResult, PgError> {
        let client = self.client.as_ref().ok_or(PgError::NotConnected)?;
        let messages = client.simple_query(query.text()).await?;

        let mut columns = Vec::new();
        let mut rows = Vec::new();
        let mut rows_affected = 0;

        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if columns.is_empty() {
                        columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    rows.push(
                        (0..row.len())
                            .map(|i| row.get(i).map(Value::from).unwrap_or(Value::Null))
                            .collect(),
                    );
                }
                SimpleQueryMessage::CommandComplete(n) => rows_affected = n,
                _ => {}
            }
        }

        let command = query
            .text()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();

        Ok(QueryResult {
            result_type: query.result_type(),
            command,
            columns,
            rows,
            rows_affected,
        })
    }
}
