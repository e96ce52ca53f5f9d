//! Database abstraction layer.
//!
//! Provides a trait-based interface for database operations, allowing
//! different backends to be used interchangeably. The registry, the schema
//! extractor, and the embedding store all talk to the database exclusively
//! through [`DatabaseClient`].

mod mock;
mod postgres;
mod types;

pub use mock::MockDatabaseClient;
pub use postgres::PostgresClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::PoolConfig;
use crate::error::{Result, SqlSenseError};
use crate::metadata::TableSchema;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    /// In-memory mock backend for tests and headless runs.
    Mock,
}

impl DatabaseBackend {
    /// Parses a backend from a connection string scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }

    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mock => "mock",
        }
    }
}

/// Creates a pooled database client for the given connection string.
///
/// This is the central factory used by the connection registry; the backend
/// is selected from the URL scheme.
pub async fn connect(conn_str: &str, pool: &PoolConfig) -> Result<Arc<dyn DatabaseClient>> {
    let url = Url::parse(conn_str)
        .map_err(|e| SqlSenseError::connection(format!("Invalid connection string: {e}")))?;

    let backend = DatabaseBackend::from_scheme(url.scheme()).ok_or_else(|| {
        SqlSenseError::connection(format!(
            "Unsupported scheme '{}'. Expected 'postgres', 'postgresql', or 'mock'",
            url.scheme()
        ))
    })?;

    match backend {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(conn_str, pool).await?;
            Ok(Arc::new(client))
        }
        DatabaseBackend::Mock => Ok(Arc::new(MockDatabaseClient::new())),
    }
}

/// Trait defining the interface for database clients.
///
/// All operations are async and return structured errors; implementations own
/// their pooling and run `execute_query` inside a per-call transaction.
#[async_trait]
pub trait DatabaseClient: Send + Sync + std::fmt::Debug {
    /// Cheap liveness check (`SELECT 1`).
    async fn ping(&self) -> Result<()>;

    /// Lists base table names in the default schema.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Introspects one table: columns, foreign keys, indexes.
    async fn table_schema(&self, table: &str) -> Result<TableSchema>;

    /// Full row count for a table.
    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// Distinct-value count for one column.
    async fn count_distinct(&self, table: &str, column: &str) -> Result<u64>;

    /// Samples up to `limit` distinct non-null values of a column, rendered
    /// as text.
    async fn sample_distinct(&self, table: &str, column: &str, limit: usize)
        -> Result<Vec<String>>;

    /// Executes a SQL string inside a transaction and materializes the result.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the underlying pool.
    async fn close(&self) -> Result<()>;
}
