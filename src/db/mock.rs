//! Mock database client for testing.
//!
//! Backed by in-memory tables so introspection, statistics, value sampling,
//! and simple SELECT filtering behave like a real database without a server.

use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{Result, SqlSenseError};
use crate::metadata::{ColumnDef, TableSchema};
use async_trait::async_trait;
use sqlparser::ast::{BinaryOperator, Expr, SetExpr, Statement, TableFactor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

/// One in-memory table: declared schema plus row data.
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    /// Table schema as introspection would report it.
    pub schema: TableSchema,
    /// Row data, positionally matching `schema.columns`.
    pub rows: Vec<Row>,
}

/// A mock database client over in-memory tables.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    tables: RwLock<BTreeMap<String, MockTable>>,
}

impl MockDatabaseClient {
    /// Creates a new mock client with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with the given columns and rows.
    pub fn with_table(
        self,
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        rows: Vec<Row>,
    ) -> Self {
        self.tables.write().unwrap().insert(
            name.into(),
            MockTable {
                schema: TableSchema {
                    columns,
                    foreign_keys: Vec::new(),
                    indexes: Vec::new(),
                },
                rows,
            },
        );
        self
    }

    fn table(&self, name: &str) -> Result<MockTable> {
        self.tables
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SqlSenseError::query(format!("relation \"{name}\" does not exist")))
    }

    fn column_index(table: &MockTable, column: &str) -> Result<usize> {
        table
            .schema
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| SqlSenseError::query(format!("column \"{column}\" does not exist")))
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.read().unwrap().keys().cloned().collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        Ok(self.table(table)?.schema)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn count_distinct(&self, table: &str, column: &str) -> Result<u64> {
        let table = self.table(table)?;
        let idx = Self::column_index(&table, column)?;

        let distinct: BTreeSet<String> = table
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter(|v| !v.is_null())
            .map(Value::to_display_string)
            .collect();

        Ok(distinct.len() as u64)
    }

    async fn sample_distinct(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let table = self.table(table)?;
        let idx = Self::column_index(&table, column)?;

        let mut seen = BTreeSet::new();
        let mut values = Vec::new();
        for row in &table.rows {
            if let Some(v) = row.get(idx) {
                if !v.is_null() {
                    let text = v.to_display_string();
                    if seen.insert(text.clone()) {
                        values.push(text);
                        if values.len() >= limit {
                            break;
                        }
                    }
                }
            }
        }

        Ok(values)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
            .map_err(|e| SqlSenseError::query(format!("syntax error: {e}")))?;

        // Only the last statement's result is reported, matching a driver
        // executing a multi-statement batch.
        let mut result = QueryResult::new();
        for statement in &statements {
            result = self.execute_statement(statement)?;
        }
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl MockDatabaseClient {
    /// Evaluates `SELECT * FROM <table> [WHERE <col> = <value>]`; any other
    /// statement shape succeeds with an empty result.
    fn execute_statement(&self, statement: &Statement) -> Result<QueryResult> {
        let Statement::Query(query) = statement else {
            return Ok(QueryResult::new());
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Ok(QueryResult::new());
        };

        let Some(table_name) = select.from.first().and_then(|twj| match &twj.relation {
            TableFactor::Table { name, .. } => {
                name.0.last().map(|ident| ident.value.clone())
            }
            _ => None,
        }) else {
            return Ok(QueryResult::new());
        };

        let table = self.table(&table_name)?;

        let rows: Vec<Row> = match &select.selection {
            None => table.rows.clone(),
            Some(expr) => {
                let (column, literal) = extract_equality(expr).ok_or_else(|| {
                    SqlSenseError::query("mock client only evaluates `col = 'value'` filters")
                })?;
                let idx = Self::column_index(&table, &column)?;
                table
                    .rows
                    .iter()
                    .filter(|row| {
                        row.get(idx)
                            .map(|v| !v.is_null() && v.to_display_string() == literal)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            }
        };

        let columns = table
            .schema
            .columns
            .iter()
            .map(|c| ColumnInfo::new(&c.name, &c.data_type))
            .collect();

        Ok(QueryResult::with_data(columns, rows))
    }
}

/// Pulls `(column, literal)` out of a `col = 'value'` expression.
fn extract_equality(expr: &Expr) -> Option<(String, String)> {
    let Expr::BinaryOp { left, op, right } = expr else {
        return None;
    };
    if *op != BinaryOperator::Eq {
        return None;
    }

    let column = match left.as_ref() {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(idents) => idents.last()?.value.clone(),
        _ => return None,
    };

    let literal = match right.as_ref() {
        Expr::Value(sqlparser::ast::Value::SingleQuotedString(s)) => s.clone(),
        Expr::Value(sqlparser::ast::Value::Number(n, _)) => n.clone(),
        _ => return None,
    };

    Some((column, literal))
}
