use super::StatementKind;
use serde::Deserialize;
use std::str::FromStr;

/// Which established connection `rollback_transaction` is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionTracking {
    /// Keep the first connection established through the session.
    ///
    /// A tracked connection that has since been dropped counts as absent.
    #[default]
    FirstEstablished,
    /// Retarget on every establish or reconnect
    LatestEstablished,
}

impl FromStr for ConnectionTracking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first_established" => Ok(Self::FirstEstablished),
            "latest" | "latest_established" => Ok(Self::LatestEstablished),
            other => Err(format!("Unknown connection tracking '{}'", other)),
        }
    }
}

/// When the nesting depth follows a transaction-control statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthUpdate {
    /// Move the depth before the statement is sent, whatever the outcome
    #[default]
    BeforeExecute,
    /// Move the depth only once the connection reports success
    AfterSuccess,
}

impl FromStr for DepthUpdate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" | "before_execute" => Ok(Self::BeforeExecute),
            "after" | "after_success" => Ok(Self::AfterSuccess),
            other => Err(format!("Unknown depth update mode '{}'", other)),
        }
    }
}

/// Transaction session configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Statement sent ahead of the first query after `start_transaction`
    pub begin_statement: String,

    /// Statement sent by `rollback_transaction`
    pub rollback_statement: String,

    pub tracking: ConnectionTracking,

    pub depth_update: DepthUpdate,
}

impl SessionConfig {
    pub const TRACKING_ENV: &'static str = "TX_SESSION_TRACKING";
    pub const DEPTH_UPDATE_ENV: &'static str = "TX_SESSION_DEPTH_UPDATE";

    pub fn new() -> Self {
        Self {
            begin_statement: "BEGIN".to_string(),
            rollback_statement: "ROLLBACK".to_string(),
            tracking: ConnectionTracking::default(),
            depth_update: DepthUpdate::default(),
        }
    }

    /// Set the deferred begin statement
    pub fn begin_statement(mut self, sql: &str) -> Self {
        self.begin_statement = sql.to_string();
        self
    }

    /// Set the forced rollback statement
    pub fn rollback_statement(mut self, sql: &str) -> Self {
        self.rollback_statement = sql.to_string();
        self
    }

    pub fn tracking(mut self, tracking: ConnectionTracking) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn depth_update(mut self, depth_update: DepthUpdate) -> Self {
        self.depth_update = depth_update;
        self
    }

    /// Defaults overridden by `TX_SESSION_TRACKING` and `TX_SESSION_DEPTH_UPDATE`
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::new();

        if let Ok(value) = std::env::var(Self::TRACKING_ENV) {
            config.tracking = value.parse()?;
        }

        if let Ok(value) = std::env::var(Self::DEPTH_UPDATE_ENV) {
            config.depth_update = value.parse()?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.begin_statement.trim().is_empty() {
            return Err("begin_statement cannot be empty".to_string());
        }

        if StatementKind::classify(&self.begin_statement) != StatementKind::Begin {
            return Err(format!(
                "begin_statement must open a transaction, got '{}'",
                self.begin_statement
            ));
        }

        if self.rollback_statement.trim().is_empty() {
            return Err("rollback_statement cannot be empty".to_string());
        }

        if StatementKind::classify(&self.rollback_statement) != StatementKind::Rollback {
            return Err(format!(
                "rollback_statement must be a ROLLBACK, got '{}'",
                self.rollback_statement
            ));
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
