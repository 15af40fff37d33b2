// ============================================================================
// src/memory/parser.rs - sqlparser adapter for the in-memory backend
// ============================================================================

use crate::core::{DbError, Result, Row, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    All,
    Columns(Vec<String>),
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    ReleaseSavepoint(String),
    RollbackToSavepoint(String),
    CreateTable {
        table_name: String,
        columns: Vec<String>,
        if_not_exists: bool,
    },
    DropTable {
        table_name: String,
        if_exists: bool,
    },
    Insert {
        table_name: String,
        columns: Option<Vec<String>>,
        rows: Vec<Row>,
    },
    Select {
        table_name: String,
        projection: Projection,
    },
    Delete {
        table_name: String,
    },
}

impl Statement {
    /// Command tag reported back in the query result
    pub(crate) fn command(&self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback | Self::RollbackToSavepoint(_) => "ROLLBACK",
            Self::Savepoint(_) => "SAVEPOINT",
            Self::ReleaseSavepoint(_) => "RELEASE",
            Self::CreateTable { .. } => "CREATE TABLE",
            Self::DropTable { .. } => "DROP TABLE",
            Self::Insert { .. } => "INSERT",
            Self::Select { .. } => "SELECT",
            Self::Delete { .. } => "DELETE",
        }
    }
}

pub(crate) struct SqlParserAdapter {
    dialect: PostgreSqlDialect,
}

impl SqlParserAdapter {
    pub(crate) fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    pub(crate) fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        // Plain transaction control is matched directly, whatever the casing
        let trimmed = sql.trim().trim_end_matches(';').trim_end().to_uppercase();
        match trimmed.as_str() {
            "BEGIN" | "BEGIN TRANSACTION" | "BEGIN WORK" | "START TRANSACTION" => {
                return Ok(vec![Statement::Begin]);
            }
            "COMMIT" | "COMMIT TRANSACTION" | "COMMIT WORK" | "END" => {
                return Ok(vec![Statement::Commit]);
            }
            "ROLLBACK" | "ROLLBACK TRANSACTION" | "ROLLBACK WORK" | "ABORT" => {
                return Ok(vec![Statement::Rollback]);
            }
            _ => {}
        }

        let external_stmts = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| DbError::ParseError(e.to_string()))?;

        external_stmts
            .into_iter()
            .map(|stmt| self.convert_statement(stmt))
            .collect()
    }

    fn convert_statement(&self, stmt: sql_ast::Statement) -> Result<Statement> {
        match stmt {
            sql_ast::Statement::StartTransaction { .. } => Ok(Statement::Begin),
            sql_ast::Statement::Commit { .. } => Ok(Statement::Commit),
            sql_ast::Statement::Rollback { savepoint, .. } => Ok(match savepoint {
                Some(name) => Statement::RollbackToSavepoint(name.value),
                None => Statement::Rollback,
            }),
            sql_ast::Statement::Savepoint { name } => Ok(Statement::Savepoint(name.value)),
            sql_ast::Statement::ReleaseSavepoint { name } => {
                Ok(Statement::ReleaseSavepoint(name.value))
            }
            sql_ast::Statement::CreateTable(create) => Ok(Statement::CreateTable {
                table_name: extract_table_name(&create.name)?,
                columns: create.columns.iter().map(|col| ident_name(&col.name)).collect(),
                if_not_exists: create.if_not_exists,
            }),
            sql_ast::Statement::Drop { object_type, names, if_exists, .. } => {
                if !matches!(object_type, sql_ast::ObjectType::Table) {
                    return Err(DbError::UnsupportedOperation(format!(
                        "Only DROP TABLE supported, got: {:?}",
                        object_type
                    )));
                }
                if names.len() != 1 {
                    return Err(DbError::UnsupportedOperation(
                        "Only single table DROP supported".into(),
                    ));
                }
                Ok(Statement::DropTable {
                    table_name: extract_table_name(&names[0])?,
                    if_exists,
                })
            }
            sql_ast::Statement::Insert(insert) => self.convert_insert(insert),
            sql_ast::Statement::Query(query) => self.convert_query(*query),
            sql_ast::Statement::Delete(delete) => self.convert_delete(delete),
            _ => Err(DbError::UnsupportedOperation(format!(
                "Statement type not supported: {}",
                stmt
            ))),
        }
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> Result<Statement> {
        let table_name = normalize_name(&insert.table.to_string());

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.iter().map(ident_name).collect())
        };

        let Some(source) = insert.source else {
            return Err(DbError::UnsupportedOperation(
                "INSERT requires a VALUES clause".into(),
            ));
        };

        let sql_ast::SetExpr::Values(values) = *source.body else {
            return Err(DbError::UnsupportedOperation(
                "Only VALUES clause supported".into(),
            ));
        };

        let rows = values
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(convert_literal).collect::<Result<Row>>())
            .collect::<Result<Vec<_>>>()?;

        Ok(Statement::Insert {
            table_name,
            columns,
            rows,
        })
    }

    fn convert_query(&self, query: sql_ast::Query) -> Result<Statement> {
        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(DbError::UnsupportedOperation(
                "Only SELECT queries supported".into(),
            ));
        };

        if select.selection.is_some() {
            return Err(DbError::UnsupportedOperation(
                "WHERE clause not supported".into(),
            ));
        }

        let table_name = match select.from.as_slice() {
            [table] if table.joins.is_empty() => match &table.relation {
                sql_ast::TableFactor::Table { name, .. } => extract_table_name(name)?,
                _ => {
                    return Err(DbError::UnsupportedOperation(
                        "Complex table references not supported".into(),
                    ));
                }
            },
            _ => {
                return Err(DbError::UnsupportedOperation(
                    "SELECT requires exactly one table".into(),
                ));
            }
        };

        let projection = convert_projection(&select.projection)?;

        Ok(Statement::Select {
            table_name,
            projection,
        })
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> Result<Statement> {
        if delete.selection.is_some() {
            return Err(DbError::UnsupportedOperation(
                "DELETE with WHERE not supported".into(),
            ));
        }

        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) => tables,
            sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };

        let table_name = match tables.first().map(|t| &t.relation) {
            Some(sql_ast::TableFactor::Table { name, .. }) => extract_table_name(name)?,
            Some(_) => {
                return Err(DbError::UnsupportedOperation(
                    "Complex table references not supported in DELETE".into(),
                ));
            }
            None => return Err(DbError::ParseError("DELETE requires table name".into())),
        };

        Ok(Statement::Delete { table_name })
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn convert_projection(items: &[sql_ast::SelectItem]) -> Result<Projection> {
    if let [item] = items {
        match item {
            sql_ast::SelectItem::Wildcard(_) => return Ok(Projection::All),
            sql_ast::SelectItem::UnnamedExpr(sql_ast::Expr::Function(func))
            | sql_ast::SelectItem::ExprWithAlias {
                expr: sql_ast::Expr::Function(func),
                ..
            } if func.name.to_string().eq_ignore_ascii_case("count") => {
                return Ok(Projection::Count);
            }
            _ => {}
        }
    }

    items
        .iter()
        .map(|item| match item {
            sql_ast::SelectItem::UnnamedExpr(sql_ast::Expr::Identifier(ident)) => {
                Ok(ident_name(ident))
            }
            _ => Err(DbError::UnsupportedOperation(format!(
                "Unsupported select item: {}",
                item
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(Projection::Columns)
}

fn convert_literal(expr: sql_ast::Expr) -> Result<Value> {
    match expr {
        sql_ast::Expr::Value(value_with_span) => match value_with_span.value {
            sql_ast::Value::Number(n, _) => n
                .parse::<i64>()
                .map(Value::Integer)
                .or_else(|_| n.parse::<f64>().map(Value::Float))
                .map_err(|_| DbError::ParseError(format!("Invalid number: {}", n))),
            sql_ast::Value::SingleQuotedString(s) => Ok(Value::Text(s)),
            sql_ast::Value::Boolean(b) => Ok(Value::Boolean(b)),
            sql_ast::Value::Null => Ok(Value::Null),
            other => Err(DbError::UnsupportedOperation(format!(
                "Unsupported literal: {}",
                other
            ))),
        },
        sql_ast::Expr::UnaryOp {
            op: sql_ast::UnaryOperator::Minus,
            expr,
        } => match convert_literal(*expr)? {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(DbError::ParseError(format!(
                "Cannot negate {}",
                other.type_name()
            ))),
        },
        other => Err(DbError::UnsupportedOperation(format!(
            "Only literal values supported, got: {}",
            other
        ))),
    }
}

/// Quoted identifiers keep their case, bare ones fold to lower case
fn ident_name(ident: &sql_ast::Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

fn normalize_name(raw: &str) -> String {
    let last = raw.rsplit('.').next().unwrap_or(raw);
    if last.len() >= 2 && last.starts_with('"') && last.ends_with('"') {
        last[1..last.len() - 1].to_string()
    } else {
        last.to_lowercase()
    }
}

fn extract_table_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|part| normalize_name(&part.to_string()))
        .ok_or_else(|| DbError::ParseError("Invalid table name".into()))
}
