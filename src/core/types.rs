use super::Value;
use std::fmt;

pub type Row = Vec<Value>;

/// The two statements that close a transaction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Commit,
    Rollback,
}

impl Boundary {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }

    /// Savepoint statement that stands in for this boundary inside a nested level
    pub fn savepoint_statement(&self, name: &str) -> String {
        match self {
            Self::Commit => format!("RELEASE SAVEPOINT {}", name),
            Self::Rollback => format!("ROLLBACK TO SAVEPOINT {}", name),
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}
