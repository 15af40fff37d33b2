// ============================================================================
// Nested Transaction Module
// ============================================================================
//
// Emulates nested transactions on connections that only support a single
// transaction level. BEGIN inside an open transaction becomes a SAVEPOINT,
// COMMIT/ROLLBACK inside a nested level become RELEASE / ROLLBACK TO.
//
// - classify: statement text -> StatementKind
// - state:    nesting depth state machine and rewrite planning
// - config:   session configuration
// - session:  shared session state and the interception path
//
// ============================================================================

pub mod classify;
pub mod config;
pub mod session;
pub mod state;

pub use classify::StatementKind;
pub use config::{ConnectionTracking, DepthUpdate, SessionConfig};
pub use session::TransactionSession;
pub use state::{TransactionState, Transition, savepoint_name};
