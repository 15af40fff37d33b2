// ============================================================================
// Nesting State Machine
// ============================================================================
//
// The nesting depth is the only state. Every transaction-control statement
// moves it by exactly one step:
//
//   Idle --begin--> Top --begin--> Nested(2) --begin--> Nested(3) ...
//   Nested(d) --commit/rollback--> Nested(d-1) or Top when d == 2
//   Top --commit/rollback--> Idle
//   Idle --commit/rollback--> error, depth unchanged
//
// Savepoints are named after the depth before the BEGIN, so levels are
// unwound in the same order they were opened.
//
// ============================================================================

use super::StatementKind;
use crate::core::TransactionStateError;
use std::fmt;

/// Observable view of the nesting depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// No transaction open
    Idle,
    /// A real top-level transaction is open
    Top,
    /// Top-level transaction plus `depth - 1` savepoints
    Nested(usize),
}

impl TransactionState {
    pub fn from_depth(depth: usize) -> Self {
        match depth {
            0 => Self::Idle,
            1 => Self::Top,
            d => Self::Nested(d),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Top => 1,
            Self::Nested(d) => *d,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Top => write!(f, "TOP"),
            Self::Nested(d) => write!(f, "NESTED({})", d),
        }
    }
}

/// Quoted savepoint identifier for a nesting level
pub fn savepoint_name(level: usize) -> String {
    format!("\"{}\"", level)
}

/// Planned effect of one statement on the nesting depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Replacement text, if the statement has to be rewritten
    pub rewrite: Option<String>,
    pub depth_before: usize,
    pub depth_after: usize,
}

impl Transition {
    /// Work out the rewrite and the new depth for a statement of `kind`
    /// executed at `depth`.
    pub fn plan(depth: usize, kind: StatementKind) -> Result<Self, TransactionStateError> {
        let (rewrite, depth_after) = match (kind, kind.boundary()) {
            (StatementKind::Begin, _) if depth > 0 => {
                (Some(format!("SAVEPOINT {}", savepoint_name(depth))), depth + 1)
            }
            (StatementKind::Begin, _) => (None, 1),
            (_, Some(boundary)) => match depth {
                0 => return Err(TransactionStateError::new(boundary)),
                1 => (None, 0),
                _ => {
                    let level = depth - 1;
                    (Some(boundary.savepoint_statement(&savepoint_name(level))), level)
                }
            },
            (_, None) => (None, depth),
        };

        Ok(Self {
            rewrite,
            depth_before: depth,
            depth_after,
        })
    }
}
