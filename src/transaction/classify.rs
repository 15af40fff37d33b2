use crate::core::Boundary;

/// What a statement does to the transaction nesting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// `BEGIN ...` or `START TRANSACTION ...`
    Begin,
    /// `COMMIT ...`
    Commit,
    /// `ROLLBACK ...`
    Rollback,
    /// Everything else, passed through untouched
    Other,
}

impl StatementKind {
    /// Classify statement text by case-insensitive prefix.
    ///
    /// Leading and trailing whitespace is ignored. The text itself is not
    /// modified.
    pub fn classify(text: &str) -> Self {
        let sql = text.trim().to_uppercase();

        if sql.starts_with("START TRANSACTION") || sql.starts_with("BEGIN") {
            Self::Begin
        } else if sql.starts_with("COMMIT") {
            Self::Commit
        } else if sql.starts_with("ROLLBACK") {
            Self::Rollback
        } else {
            Self::Other
        }
    }

    pub fn boundary(&self) -> Option<Boundary> {
        match self {
            Self::Commit => Some(Boundary::Commit),
            Self::Rollback => Some(Boundary::Rollback),
            Self::Begin | Self::Other => None,
        }
    }

    pub fn is_transaction_control(&self) -> bool {
        !matches!(self, Self::Other)
    }
}
