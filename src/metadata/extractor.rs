//! Schema and statistics extraction.
//!
//! Walks every table reachable through a [`DatabaseClient`] and builds the
//! `Metadata` unit cached per connection. A failure enumerating tables is
//! fatal; a failure computing stats for one table or column is logged and
//! that entry is omitted, so partial results are returned rather than
//! aborting the whole extraction.

use crate::db::DatabaseClient;
use crate::error::Result;
use crate::metadata::{Metadata, TableStats};
use std::collections::BTreeMap;
use tracing::warn;

/// Builds [`Metadata`] from a live connection.
#[derive(Debug, Default)]
pub struct SchemaExtractor;

impl SchemaExtractor {
    /// Creates a new extractor.
    pub fn new() -> Self {
        Self
    }

    /// Introspects the database: per-table schema, then per-table stats.
    pub async fn extract(&self, client: &dyn DatabaseClient) -> Result<Metadata> {
        let mut schema = BTreeMap::new();
        let mut stats = BTreeMap::new();

        for table in client.table_names().await? {
            let table_schema = client.table_schema(&table).await?;
            let table_stats = self.extract_stats(client, &table, &table_schema).await;

            schema.insert(table.clone(), table_schema);
            stats.insert(table, table_stats);
        }

        Ok(Metadata { schema, stats })
    }

    /// Computes row count and per-column cardinality for one table.
    ///
    /// Any failure here degrades: a failed row count yields empty stats, a
    /// failed distinct count omits that column's entry.
    async fn extract_stats(
        &self,
        client: &dyn DatabaseClient,
        table: &str,
        table_schema: &crate::metadata::TableSchema,
    ) -> TableStats {
        let row_count = match client.count_rows(table).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Error fetching stats for {table}: {e}");
                return TableStats::default();
            }
        };

        let mut cardinality = BTreeMap::new();
        for column in &table_schema.columns {
            match client.count_distinct(table, &column.name).await {
                Ok(distinct) => {
                    let ratio = if row_count == 0 {
                        0.0
                    } else {
                        distinct as f64 / row_count as f64
                    };
                    cardinality.insert(column.name.clone(), ratio);
                }
                Err(e) => {
                    warn!("Error fetching cardinality for {table}.{}: {e}", column.name);
                }
            }
        }

        TableStats {
            row_count,
            cardinality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockDatabaseClient, Value};
    use crate::metadata::ColumnDef;

    fn two_table_client() -> MockDatabaseClient {
        MockDatabaseClient::new()
            .with_table(
                "users",
                vec![
                    ColumnDef::new("id", "integer").nullable(false),
                    ColumnDef::new("name", "varchar(100)"),
                ],
                vec![
                    vec![Value::Int(1), Value::String("alice".to_string())],
                    vec![Value::Int(2), Value::String("bob".to_string())],
                ],
            )
            .with_table(
                "orders",
                vec![
                    ColumnDef::new("id", "integer").nullable(false),
                    ColumnDef::new("status", "varchar(20)"),
                ],
                vec![
                    vec![Value::Int(1), Value::String("shipped".to_string())],
                    vec![Value::Int(2), Value::String("shipped".to_string())],
                    vec![Value::Int(3), Value::String("pending".to_string())],
                    vec![Value::Int(4), Value::String("pending".to_string())],
                ],
            )
    }

    #[tokio::test]
    async fn test_extract_builds_schema_and_stats() {
        let client = two_table_client();
        let metadata = SchemaExtractor::new().extract(&client).await.unwrap();

        assert_eq!(metadata.schema.len(), 2);
        assert_eq!(metadata.schema["users"].columns.len(), 2);
        assert_eq!(metadata.row_count("orders"), 4);

        // 2 distinct statuses over 4 rows
        assert_eq!(metadata.cardinality("orders", "status"), Some(0.5));
        // ids are all distinct
        assert_eq!(metadata.cardinality("orders", "id"), Some(1.0));
    }

    #[tokio::test]
    async fn test_empty_table_has_zero_cardinality() {
        let client = MockDatabaseClient::new().with_table(
            "empty",
            vec![ColumnDef::new("name", "text")],
            vec![],
        );

        let metadata = SchemaExtractor::new().extract(&client).await.unwrap();
        assert_eq!(metadata.row_count("empty"), 0);
        assert_eq!(metadata.cardinality("empty", "name"), Some(0.0));
    }

    #[tokio::test]
    async fn test_extract_empty_database() {
        let client = MockDatabaseClient::new();
        let metadata = SchemaExtractor::new().extract(&client).await.unwrap();
        assert!(metadata.schema.is_empty());
        assert!(metadata.stats.is_empty());
    }
}
