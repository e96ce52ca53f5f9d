//! Query execution.
//!
//! Runs a (possibly patched) statement through a pooled client inside a
//! per-call transaction, measuring wall-clock time around the execute call
//! only, with the query log's before/after hooks wrapped around every
//! execution.

use crate::db::{DatabaseClient, QueryResult};
use crate::error::Result;
use crate::query::QueryLogger;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executes SQL and reports rows, duration, or a structured failure.
pub struct QueryExecutor {
    logger: Arc<QueryLogger>,
}

/// Successful execution: the materialized result and how long it took.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Materialized result set (empty for non-row statements).
    pub result: QueryResult,

    /// Wall-clock duration of the execute call.
    pub duration: Duration,
}

impl QueryExecutor {
    /// Creates an executor whose executions feed the given log.
    pub fn new(logger: Arc<QueryLogger>) -> Self {
        Self { logger }
    }

    /// Executes `sql` on `client` inside a transaction.
    ///
    /// The logger observes the execution whether it succeeds or fails; a
    /// database failure surfaces as a structured `Query` error with the
    /// transaction rolled back by the client.
    pub async fn execute(&self, client: &dyn DatabaseClient, sql: &str) -> Result<QueryOutcome> {
        let timer = self.logger.before();
        let start = Instant::now();
        let result = client.execute_query(sql).await;
        let duration = start.elapsed();
        self.logger.after(timer, sql);

        let result = result?;
        Ok(QueryOutcome { result, duration })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockDatabaseClient, Value};
    use crate::error::SqlSenseError;
    use crate::metadata::ColumnDef;

    fn client() -> MockDatabaseClient {
        MockDatabaseClient::new().with_table(
            "orders",
            vec![
                ColumnDef::new("id", "integer").nullable(false),
                ColumnDef::new("status", "varchar(20)"),
            ],
            vec![
                vec![Value::Int(1), Value::String("shipped".to_string())],
                vec![Value::Int(2), Value::String("pending".to_string())],
            ],
        )
    }

    #[tokio::test]
    async fn test_execute_returns_rows_and_duration() {
        let logger = Arc::new(QueryLogger::new());
        let executor = QueryExecutor::new(Arc::clone(&logger));
        let client = client();

        let outcome = executor
            .execute(&client, "SELECT * FROM orders WHERE status = 'shipped'")
            .await
            .unwrap();

        assert_eq!(outcome.result.row_count(), 1);
        assert!(outcome.result.returns_rows());
    }

    #[tokio::test]
    async fn test_execute_logs_even_on_failure() {
        let logger = Arc::new(QueryLogger::new());
        let executor = QueryExecutor::new(Arc::clone(&logger));
        let client = client();

        let result = executor.execute(&client, "SELECT * FROM missing").await;
        assert!(matches!(result, Err(SqlSenseError::Query(_))));

        // The failed execution was still observed.
        assert_eq!(logger.entry("SELECT * FROM missing").unwrap().frequency, 1);
    }

    #[tokio::test]
    async fn test_repeated_execution_aggregates_log() {
        let logger = Arc::new(QueryLogger::new());
        let executor = QueryExecutor::new(Arc::clone(&logger));
        let client = client();

        let sql = "SELECT * FROM orders";
        executor.execute(&client, sql).await.unwrap();
        executor.execute(&client, sql).await.unwrap();

        let entry = logger.entry(sql).unwrap();
        assert_eq!(entry.frequency, 2);
    }
}
