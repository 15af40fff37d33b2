use crate::core::{Row, Value};
use serde::{Deserialize, Serialize};

/// Shape the caller wants the rows in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// Rows as positional value lists
    #[default]
    Array,
    /// Rows keyed by column name
    Object,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub result_type: ResultType,
    /// Command tag of the statement that produced this result (`INSERT`, `SAVEPOINT`, ...)
    pub command: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn empty(command: impl Into<String>) -> Self {
        Self {
            result_type: ResultType::Array,
            command: command.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    pub fn new(command: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            result_type: ResultType::Array,
            command: command.into(),
            columns,
            rows,
            rows_affected,
        }
    }

    pub fn affected(command: impl Into<String>, rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::empty(command)
        }
    }

    pub fn with_result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = result_type;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// First column of the first row, e.g. the result of `SELECT COUNT(*)`
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Rows keyed by column name
    pub fn objects(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}
