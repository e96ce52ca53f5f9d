//! Query analytics log.
//!
//! Hooks around every execution: `before` captures a start instant, `after`
//! normalizes the executed text, re-parses it (splitting multi-statement
//! input), and aggregates per-statement execution time, frequency, and the
//! column names referenced in WHERE, JOIN, and ORDER BY clauses. Logging
//! failures degrade to recording the raw text and never affect the query
//! that triggered them.

use sha2::{Digest, Sha256};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, JoinConstraint, Query, Select, SetExpr,
    Statement,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::warn;

/// Start-of-execution marker handed back by [`QueryLogger::before`].
#[derive(Debug)]
pub struct QueryTimer {
    start: Instant,
}

/// Accumulated statistics for one normalized statement.
#[derive(Debug, Clone, Default)]
pub struct QueryLogEntry {
    /// Normalized statement text.
    pub statement: String,

    /// Total wall-clock time across executions.
    pub total_duration: Duration,

    /// Number of executions observed.
    pub frequency: u64,

    /// Columns referenced in WHERE clauses.
    pub where_columns: BTreeSet<String>,

    /// Columns referenced in JOIN constraints.
    pub join_columns: BTreeSet<String>,

    /// Columns referenced in ORDER BY clauses.
    pub order_by_columns: BTreeSet<String>,
}

/// Process-wide per-statement execution log. Entries are never removed.
#[derive(Debug, Default)]
pub struct QueryLogger {
    entries: RwLock<HashMap<String, QueryLogEntry>>,
}

impl QueryLogger {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Before-execution hook: captures the start timestamp.
    pub fn before(&self) -> QueryTimer {
        QueryTimer {
            start: Instant::now(),
        }
    }

    /// After-execution hook: attributes the elapsed time to every statement
    /// in the executed text.
    pub fn after(&self, timer: QueryTimer, sql: &str) {
        self.record(sql, timer.start.elapsed());
    }

    /// Records one execution of `sql` taking `elapsed`.
    ///
    /// Multi-statement input is split and the full elapsed time is attributed
    /// to each sub-statement. A parse failure records the raw normalized text
    /// with empty column sets.
    pub fn record(&self, sql: &str, elapsed: Duration) {
        let normalized = normalize(sql);

        let observed: Vec<(String, ColumnSets)> =
            match Parser::parse_sql(&PostgreSqlDialect {}, &normalized) {
                Ok(statements) if !statements.is_empty() => statements
                    .iter()
                    .map(|statement| {
                        let mut sets = ColumnSets::default();
                        extract_from_statement(statement, &mut sets);
                        (statement.to_string(), sets)
                    })
                    .collect(),
                Ok(_) => return,
                Err(e) => {
                    warn!("SQL parse error while logging, recording raw text: {e}");
                    vec![(normalized, ColumnSets::default())]
                }
            };

        let mut entries = self.entries.write().unwrap();
        for (statement, sets) in observed {
            let key = hash_text(&statement);
            let entry = entries.entry(key).or_insert_with(|| QueryLogEntry {
                statement: statement.clone(),
                where_columns: sets.where_columns.clone(),
                join_columns: sets.join_columns.clone(),
                order_by_columns: sets.order_by_columns.clone(),
                ..QueryLogEntry::default()
            });
            entry.frequency += 1;
            entry.total_duration += elapsed;
        }
    }

    /// Looks up the entry for a statement, normalizing it the same way
    /// `record` does.
    pub fn entry(&self, sql: &str) -> Option<QueryLogEntry> {
        let normalized = normalize(sql);
        let key = match Parser::parse_sql(&PostgreSqlDialect {}, &normalized) {
            Ok(statements) if statements.len() == 1 => hash_text(&statements[0].to_string()),
            _ => hash_text(&normalized),
        };
        self.entries.read().unwrap().get(&key).cloned()
    }

    /// Snapshot of every entry, ordered by descending frequency.
    pub fn entries(&self) -> Vec<QueryLogEntry> {
        let mut entries: Vec<QueryLogEntry> =
            self.entries.read().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        entries
    }

    /// Number of distinct normalized statements seen.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Returns true when nothing has been logged yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

/// Trims surrounding whitespace and trailing statement separators.
fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim_end().to_string()
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default)]
struct ColumnSets {
    where_columns: BTreeSet<String>,
    join_columns: BTreeSet<String>,
    order_by_columns: BTreeSet<String>,
}

fn extract_from_statement(statement: &Statement, sets: &mut ColumnSets) {
    match statement {
        Statement::Query(query) => extract_from_query(query, sets),
        Statement::Insert(insert) => {
            if let Some(source) = &insert.source {
                extract_from_query(source, sets);
            }
        }
        Statement::Update { selection, .. } => {
            if let Some(expr) = selection {
                collect_columns(expr, &mut sets.where_columns);
            }
        }
        Statement::Delete(delete) => {
            if let Some(expr) = &delete.selection {
                collect_columns(expr, &mut sets.where_columns);
            }
        }
        _ => {}
    }
}

fn extract_from_query(query: &Query, sets: &mut ColumnSets) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            extract_from_query(&cte.query, sets);
        }
    }

    extract_from_set_expr(&query.body, sets);

    if let Some(order_by) = &query.order_by {
        for order_expr in &order_by.exprs {
            collect_columns(&order_expr.expr, &mut sets.order_by_columns);
        }
    }
}

fn extract_from_set_expr(set_expr: &SetExpr, sets: &mut ColumnSets) {
    match set_expr {
        SetExpr::Select(select) => extract_from_select(select, sets),
        SetExpr::Query(query) => extract_from_query(query, sets),
        SetExpr::SetOperation { left, right, .. } => {
            extract_from_set_expr(left, sets);
            extract_from_set_expr(right, sets);
        }
        SetExpr::Insert(statement) | SetExpr::Update(statement) => {
            extract_from_statement(statement, sets);
        }
        _ => {}
    }
}

fn extract_from_select(select: &Select, sets: &mut ColumnSets) {
    if let Some(expr) = &select.selection {
        collect_columns(expr, &mut sets.where_columns);
    }

    for table_with_joins in &select.from {
        for join in &table_with_joins.joins {
            if let Some(constraint) = join_constraint(&join.join_operator) {
                match constraint {
                    JoinConstraint::On(expr) => collect_columns(expr, &mut sets.join_columns),
                    JoinConstraint::Using(idents) => {
                        for ident in idents {
                            sets.join_columns.insert(ident.value.clone());
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn join_constraint(operator: &sqlparser::ast::JoinOperator) -> Option<&JoinConstraint> {
    use sqlparser::ast::JoinOperator::*;
    match operator {
        Inner(c) | LeftOuter(c) | RightOuter(c) | FullOuter(c) | LeftSemi(c) | RightSemi(c)
        | LeftAnti(c) | RightAnti(c) | AsOf { constraint: c, .. } => Some(c),
        _ => None,
    }
}

/// Collects column names referenced anywhere in an expression tree. Compound
/// identifiers contribute their final segment, matching how the analytics
/// surface keys on bare column names.
fn collect_columns(expr: &Expr, columns: &mut BTreeSet<String>) {
    match expr {
        Expr::Identifier(ident) => {
            columns.insert(ident.value.clone());
        }
        Expr::CompoundIdentifier(parts) => {
            if let Some(last) = parts.last() {
                columns.insert(last.value.clone());
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_columns(left, columns);
            collect_columns(right, columns);
        }
        Expr::UnaryOp { expr, .. } => collect_columns(expr, columns),
        Expr::Nested(inner) => collect_columns(inner, columns),
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => collect_columns(inner, columns),
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_columns(expr, columns);
            collect_columns(low, columns);
            collect_columns(high, columns);
        }
        Expr::InList { expr, list, .. } => {
            collect_columns(expr, columns);
            for item in list {
                collect_columns(item, columns);
            }
        }
        Expr::InSubquery { expr, .. } => collect_columns(expr, columns),
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            collect_columns(expr, columns);
            collect_columns(pattern, columns);
        }
        Expr::Cast { expr, .. } => collect_columns(expr, columns),
        Expr::Function(function) => {
            if let FunctionArguments::List(list) = &function.args {
                for arg in &list.args {
                    let (FunctionArg::Named { arg, .. } | FunctionArg::Unnamed(arg)) = arg;
                    if let FunctionArgExpr::Expr(inner) = arg {
                        collect_columns(inner, columns);
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_same_statement_aggregates() {
        let logger = QueryLogger::new();
        let sql = "SELECT * FROM orders WHERE status = 'shipped'";

        logger.record(sql, Duration::from_millis(5));
        // Normalization makes these the same statement.
        logger.record("  SELECT * FROM orders WHERE status = 'shipped';  ", Duration::from_millis(7));

        let entry = logger.entry(sql).unwrap();
        assert_eq!(entry.frequency, 2);
        assert_eq!(entry.total_duration, Duration::from_millis(12));
        assert_eq!(logger.len(), 1);
    }

    #[test]
    fn test_column_extraction() {
        let logger = QueryLogger::new();
        logger.record(
            "SELECT u.name FROM users u \
             JOIN orders o ON u.id = o.user_id \
             WHERE o.status = 'shipped' AND o.total > 10 \
             ORDER BY o.created_at",
            Duration::from_millis(1),
        );

        let entry = &logger.entries()[0];
        assert_eq!(
            entry.where_columns,
            BTreeSet::from(["status".to_string(), "total".to_string()])
        );
        assert_eq!(
            entry.join_columns,
            BTreeSet::from(["id".to_string(), "user_id".to_string()])
        );
        assert_eq!(
            entry.order_by_columns,
            BTreeSet::from(["created_at".to_string()])
        );
    }

    #[test]
    fn test_multi_statement_splits_entries() {
        let logger = QueryLogger::new();
        logger.record(
            "SELECT 1; SELECT * FROM orders WHERE status = 'x'",
            Duration::from_millis(3),
        );

        assert_eq!(logger.len(), 2);
        // Both sub-statements carry the full elapsed time.
        for entry in logger.entries() {
            assert_eq!(entry.total_duration, Duration::from_millis(3));
            assert_eq!(entry.frequency, 1);
        }
    }

    #[test]
    fn test_parse_failure_records_raw_text() {
        let logger = QueryLogger::new();
        let raw = "SELEC * FRM nowhere";
        logger.record(raw, Duration::from_millis(2));

        let entry = logger.entry(raw).unwrap();
        assert_eq!(entry.statement, raw);
        assert!(entry.where_columns.is_empty());
        assert!(entry.join_columns.is_empty());
        assert!(entry.order_by_columns.is_empty());
    }

    #[test]
    fn test_before_after_hooks() {
        let logger = QueryLogger::new();
        let timer = logger.before();
        logger.after(timer, "SELECT 1");

        let entry = logger.entry("SELECT 1").unwrap();
        assert_eq!(entry.frequency, 1);
    }

    #[test]
    fn test_empty_input_ignored() {
        let logger = QueryLogger::new();
        logger.record("", Duration::from_millis(1));
        assert!(logger.is_empty());
    }

    #[test]
    fn test_union_collects_both_where_clauses() {
        let logger = QueryLogger::new();
        logger.record(
            "SELECT id FROM orders WHERE status = 'x' \
             UNION SELECT id FROM archive WHERE archived_at IS NULL",
            Duration::from_millis(1),
        );

        let entry = &logger.entries()[0];
        assert_eq!(
            entry.where_columns,
            BTreeSet::from(["archived_at".to_string(), "status".to_string()])
        );
    }

    #[test]
    fn test_using_join_columns() {
        let logger = QueryLogger::new();
        logger.record(
            "SELECT * FROM a JOIN b USING (tenant_id)",
            Duration::from_millis(1),
        );

        let entry = &logger.entries()[0];
        assert_eq!(entry.join_columns, BTreeSet::from(["tenant_id".to_string()]));
    }
}
