pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, MissingEnvVar, Result, TransactionStateError};
pub use types::{Boundary, Row};
pub use value::Value;
