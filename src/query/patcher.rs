//! Semantic patching of SQL literals.
//!
//! Parses statements with sqlparser and rewrites string literals in WHERE
//! equality predicates: when the literal is not a known value for that
//! column, it is replaced by the nearest cached value above the similarity
//! threshold. Everything else in the statement is left untouched, and the
//! result is re-serialized from the AST.

use crate::semantic::EmbeddingStore;
use sqlparser::ast::{
    BinaryOperator, Expr, FromTable, Query, SetExpr, Statement, TableFactor, TableWithJoins, Value,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bucket used for columns whose table cannot be resolved.
pub const UNQUALIFIED_TABLE: &str = "__default__";

/// Rewrites string-literal equality operands using the semantic value cache.
pub struct QueryPatcher {
    store: Arc<EmbeddingStore>,
    similarity_threshold: f32,
}

impl QueryPatcher {
    /// Creates a patcher over the given store.
    pub fn new(store: Arc<EmbeddingStore>, similarity_threshold: f32) -> Self {
        Self {
            store,
            similarity_threshold,
        }
    }

    /// Patches one or more `;`-separated statements independently and rejoins
    /// them with `";\n"`.
    ///
    /// A parse failure on the whole input degrades to passing the raw text
    /// through unchanged; execution is still attempted by the caller.
    pub fn patch(&self, conn_str: &str, raw_sql: &str) -> String {
        let mut statements = match Parser::parse_sql(&PostgreSqlDialect {}, raw_sql) {
            Ok(statements) if !statements.is_empty() => statements,
            Ok(_) => return raw_sql.to_string(),
            Err(e) => {
                warn!("SQL parse error, passing query through unpatched: {e}");
                return raw_sql.to_string();
            }
        };

        for statement in &mut statements {
            self.patch_statement(conn_str, statement);
        }

        statements
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";\n")
    }

    fn patch_statement(&self, conn_str: &str, statement: &mut Statement) {
        match statement {
            Statement::Query(query) => self.patch_query(conn_str, query),
            Statement::Insert(insert) => {
                if let Some(source) = &mut insert.source {
                    self.patch_query(conn_str, source);
                }
            }
            Statement::Update {
                table, selection, ..
            } => {
                let default_table = single_table_name(std::slice::from_ref(table));
                if let Some(expr) = selection {
                    self.patch_where_expr(conn_str, expr, default_table.as_deref());
                }
            }
            Statement::Delete(delete) => {
                let from = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => {
                        tables.as_slice()
                    }
                };
                let default_table = single_table_name(from);
                if let Some(expr) = &mut delete.selection {
                    self.patch_where_expr(conn_str, expr, default_table.as_deref());
                }
            }
            _ => {}
        }
    }

    fn patch_query(&self, conn_str: &str, query: &mut Query) {
        if let Some(with) = &mut query.with {
            for cte in &mut with.cte_tables {
                self.patch_query(conn_str, &mut cte.query);
            }
        }
        self.patch_set_expr(conn_str, &mut query.body);
    }

    fn patch_set_expr(&self, conn_str: &str, set_expr: &mut SetExpr) {
        match set_expr {
            SetExpr::Select(select) => {
                let default_table = single_table_name(&select.from);
                for table_with_joins in &mut select.from {
                    self.patch_table_with_joins(conn_str, table_with_joins);
                }
                if let Some(expr) = &mut select.selection {
                    self.patch_where_expr(conn_str, expr, default_table.as_deref());
                }
            }
            SetExpr::Query(query) => self.patch_query(conn_str, query),
            SetExpr::SetOperation { left, right, .. } => {
                self.patch_set_expr(conn_str, left);
                self.patch_set_expr(conn_str, right);
            }
            SetExpr::Insert(statement) | SetExpr::Update(statement) => {
                self.patch_statement(conn_str, statement)
            }
            _ => {}
        }
    }

    /// Recurses into derived tables so WHERE clauses of subqueries in FROM
    /// are patched too.
    fn patch_table_with_joins(&self, conn_str: &str, twj: &mut TableWithJoins) {
        self.patch_table_factor(conn_str, &mut twj.relation);
        for join in &mut twj.joins {
            self.patch_table_factor(conn_str, &mut join.relation);
        }
    }

    fn patch_table_factor(&self, conn_str: &str, factor: &mut TableFactor) {
        if let TableFactor::Derived { subquery, .. } = factor {
            self.patch_query(conn_str, subquery);
        }
    }

    /// Walks a WHERE expression tree looking for `column = 'literal'`.
    /// `default_table` resolves unqualified columns when the FROM clause
    /// names exactly one table.
    fn patch_where_expr(&self, conn_str: &str, expr: &mut Expr, default_table: Option<&str>) {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And | BinaryOperator::Or,
                right,
            } => {
                self.patch_where_expr(conn_str, left, default_table);
                self.patch_where_expr(conn_str, right, default_table);
            }
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            } => self.patch_equality(conn_str, left, right, default_table),
            Expr::Nested(inner) => self.patch_where_expr(conn_str, inner, default_table),
            Expr::UnaryOp { expr, .. } => self.patch_where_expr(conn_str, expr, default_table),
            Expr::InSubquery { subquery, .. } => self.patch_query(conn_str, subquery),
            Expr::Exists { subquery, .. } => self.patch_query(conn_str, subquery),
            _ => {}
        }
    }

    /// Substitutes the right operand of `column = 'literal'` when the literal
    /// is not already a known value for that column. Non-column left
    /// operands and non-string right operands are left untouched.
    fn patch_equality(
        &self,
        conn_str: &str,
        left: &Expr,
        right: &mut Expr,
        default_table: Option<&str>,
    ) {
        let (table, column) = match left {
            Expr::Identifier(ident) => (
                default_table.unwrap_or(UNQUALIFIED_TABLE).to_string(),
                ident.value.clone(),
            ),
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => (
                parts[parts.len() - 2].value.clone(),
                parts[parts.len() - 1].value.clone(),
            ),
            _ => return,
        };

        let Expr::Value(Value::SingleQuotedString(literal)) = right else {
            return;
        };

        if self.store.has_value(conn_str, &table, &column, literal) {
            return;
        }

        let corrected =
            self.store
                .nearest_value(conn_str, &table, &column, literal, self.similarity_threshold);
        if corrected != *literal {
            debug!("Patched literal '{literal}' -> '{corrected}' for {table}.{column}");
            *literal = corrected;
        }
    }
}

/// The table name a bare column can only belong to: a FROM clause of exactly
/// one join-free, non-derived table. Joined or derived sources are ambiguous
/// and resolve to nothing.
fn single_table_name(from: &[TableWithJoins]) -> Option<String> {
    match from {
        [twj] if twj.joins.is_empty() => match &twj.relation {
            TableFactor::Table { name, .. } => name.0.last().map(|ident| ident.value.clone()),
            _ => None,
        },
        _ => None,
    }
}
