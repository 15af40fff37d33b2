use crate::core::{DbError, Result, Row, Value};

/// Table data. Rows live in a persistent vector so snapshots share structure.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: im::Vector<Row>,
}

impl Table {
    fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: im::Vector::new(),
        }
    }

    fn column_index(&self, table_name: &str, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string(), table_name.to_string()))
    }
}

/// All tables of a database.
///
/// Cloning is cheap, which is what savepoints rely on.
#[derive(Debug, Clone, Default)]
pub(crate) struct Catalog {
    tables: im::HashMap<String, Table>,
}

impl Catalog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn create_table(
        &mut self,
        table_name: &str,
        columns: Vec<String>,
        if_not_exists: bool,
    ) -> Result<()> {
        if self.tables.contains_key(table_name) {
            if if_not_exists {
                return Ok(());
            }
            return Err(DbError::TableExists(table_name.to_string()));
        }

        self.tables.insert(table_name.to_string(), Table::new(columns));
        Ok(())
    }

    pub(crate) fn drop_table(&mut self, table_name: &str, if_exists: bool) -> Result<()> {
        match self.tables.remove(table_name) {
            Some(_) => Ok(()),
            None if if_exists => Ok(()),
            None => Err(DbError::TableNotFound(table_name.to_string())),
        }
    }

    pub(crate) fn table(&self, table_name: &str) -> Result<&Table> {
        self.tables
            .get(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))
    }

    fn table_mut(&mut self, table_name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(table_name)
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))
    }

    /// Insert rows, either positional or for the listed columns.
    ///
    /// Columns left out of the list are filled with NULL.
    pub(crate) fn insert(
        &mut self,
        table_name: &str,
        columns: Option<&[String]>,
        rows: Vec<Row>,
    ) -> Result<usize> {
        let table = self.table_mut(table_name)?;
        let width = table.columns.len();

        let positions = match columns {
            Some(columns) => Some(
                columns
                    .iter()
                    .map(|c| table.column_index(table_name, c))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            let expected = positions.as_ref().map_or(width, Vec::len);
            if row.len() != expected {
                return Err(DbError::ExecutionError(format!(
                    "INSERT has {} values but {} columns were expected",
                    row.len(),
                    expected
                )));
            }

            let full = match &positions {
                Some(positions) => {
                    let mut full = vec![Value::Null; width];
                    for (value, &index) in row.into_iter().zip(positions) {
                        full[index] = value;
                    }
                    full
                }
                None => row,
            };
            prepared.push(full);
        }

        let count = prepared.len();
        table.rows.extend(prepared);
        Ok(count)
    }

    pub(crate) fn delete_all(&mut self, table_name: &str) -> Result<usize> {
        let table = self.table_mut(table_name)?;
        let count = table.rows.len();
        table.rows.clear();
        Ok(count)
    }

    pub(crate) fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}
