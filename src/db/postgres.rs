//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient`
//! trait using sqlx. Introspection runs against `information_schema` and
//! `pg_catalog`; statement execution runs inside a per-call transaction.

use crate::config::PoolConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{Result, SqlSenseError};
use crate::metadata::{ColumnDef, ForeignKey, Index, TableSchema};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::debug;

/// Query timeout in seconds.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// PostgreSQL database client backed by a bounded connection pool.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects to the database described by `conn_str` with a bounded pool.
    ///
    /// Connection failures are surfaced immediately with the driver's message;
    /// there is no automatic retry.
    pub async fn connect(conn_str: &str, pool: &PoolConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool.max_connections)
            .acquire_timeout(Duration::from_secs(pool.acquire_timeout_secs))
            .connect(conn_str)
            .await
            .map_err(map_connection_error)?;

        debug!("Connected to database");
        Ok(Self { pool })
    }

    /// Creates a client from an existing connection pool (tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(map_connection_error)?;
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqlSenseError::query(format!("Failed to fetch tables: {e}")))
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let columns = self.fetch_columns(table).await?;
        let foreign_keys = self.fetch_foreign_keys(table).await?;
        let indexes = self.fetch_indexes(table).await?;

        Ok(TableSchema {
            columns,
            foreign_keys,
            indexes,
        })
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(table)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SqlSenseError::query(format!("Failed to count rows of {table}: {e}")))?;

        Ok(count.max(0) as u64)
    }

    async fn count_distinct(&self, table: &str, column: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(DISTINCT {}) FROM {}",
            quote_ident(column),
            quote_ident(table)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            SqlSenseError::query(format!("Failed to count distinct {table}.{column}: {e}"))
        })?;

        Ok(count.max(0) as u64)
    }

    async fn sample_distinct(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let col = quote_ident(column);
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT {col}::text FROM {} WHERE {col} IS NOT NULL LIMIT {limit}",
            quote_ident(table)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            SqlSenseError::query(format!("Failed to sample {table}.{column}: {e}"))
        })?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<Option<String>, _>(0).ok().flatten())
            .collect())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SqlSenseError::query(format!("Failed to open transaction: {e}")))?;

        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            tx.fetch_all(sql),
        )
        .await
        .map_err(|_| {
            SqlSenseError::query(format!("Query timed out after {QUERY_TIMEOUT_SECS} seconds"))
        })?
        .map_err(|e| SqlSenseError::query(format_query_error(e)))?;

        // An error above drops the transaction, rolling it back.
        tx.commit()
            .await
            .map_err(|e| SqlSenseError::query(format!("Failed to commit: {e}")))?;

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Row> = result.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

impl PostgresClient {
    /// Fetches columns for a specific table.
    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnDef>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                column_name::text,
                data_type::text,
                is_nullable::text
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqlSenseError::query(format!("Failed to fetch columns for {table}: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable)| ColumnDef {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
            })
            .collect())
    }

    /// Fetches foreign key constraints for a specific table.
    async fn fetch_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                tc.constraint_name::text,
                kcu.column_name::text,
                ccu.table_name::text AS referenced_table,
                ccu.column_name::text AS referenced_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.table_name = $1
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            SqlSenseError::query(format!("Failed to fetch foreign keys for {table}: {e}"))
        })?;

        // Group by constraint name to keep multi-column keys together.
        let mut fk_map: std::collections::BTreeMap<String, ForeignKey> =
            std::collections::BTreeMap::new();

        for (constraint, column, referenced_table, referenced_column) in rows {
            let entry = fk_map.entry(constraint).or_insert_with(|| ForeignKey {
                columns: Vec::new(),
                referenced_table,
                referenced_columns: Vec::new(),
            });
            entry.columns.push(column);
            entry.referenced_columns.push(referenced_column);
        }

        Ok(fk_map.into_values().collect())
    }

    /// Fetches non-primary-key indexes for a specific table.
    async fn fetch_indexes(&self, table: &str) -> Result<Vec<Index>> {
        let rows: Vec<(String, String, bool)> = sqlx::query_as(
            r#"
            SELECT
                i.relname::text AS index_name,
                a.attname::text AS column_name,
                ix.indisunique AS is_unique
            FROM pg_class t
            JOIN pg_index ix ON t.oid = ix.indrelid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            JOIN pg_namespace n ON n.oid = t.relnamespace
            WHERE n.nspname = 'public'
                AND t.relname = $1
                AND NOT ix.indisprimary
            ORDER BY i.relname, a.attnum
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SqlSenseError::query(format!("Failed to fetch indexes for {table}: {e}")))?;

        let mut index_map: std::collections::BTreeMap<String, (Vec<String>, bool)> =
            std::collections::BTreeMap::new();

        for (index_name, column_name, is_unique) in rows {
            index_map
                .entry(index_name)
                .or_insert_with(|| (Vec::new(), is_unique))
                .0
                .push(column_name);
        }

        Ok(index_map
            .into_iter()
            .map(|(name, (columns, is_unique))| Index {
                name,
                columns,
                is_unique,
            })
            .collect())
    }
}

/// Double-quotes an identifier for interpolation into introspection SQL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // For all other types, try to get as string
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Maps sqlx connection errors to user-facing messages.
fn map_connection_error(error: sqlx::Error) -> SqlSenseError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        SqlSenseError::connection("Cannot connect. Check that the server is running.")
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        SqlSenseError::connection("Authentication failed. Check your credentials.")
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        SqlSenseError::connection("Database does not exist.")
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        SqlSenseError::connection(
            "Server requires SSL. Add '?sslmode=require' to the connection string.",
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        SqlSenseError::connection(
            "Connection timed out. The server may be overloaded or unreachable.",
        )
    } else {
        SqlSenseError::connection(error.to_string())
    }
}

/// Formats a query error with Postgres detail and hint fields if available.
fn format_query_error(error: sqlx::Error) -> String {
    let mut result = String::new();

    if let Some(db_error) = error.as_database_error() {
        result.push_str("ERROR: ");
        result.push_str(db_error.message());

        if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            if let Some(detail) = pg_error.detail() {
                result.push_str("\n  DETAIL: ");
                result.push_str(detail);
            }

            if let Some(hint) = pg_error.hint() {
                result.push_str("\n  HINT: ");
                result.push_str(hint);
            }
        }
    } else {
        result = error.to_string();
    }

    result
}
