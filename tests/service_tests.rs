//! End-to-end tests for the service layer over the mock backend.
//!
//! A registered mock database stands in for PostgreSQL: validation builds
//! the metadata and embedding caches, and subsequent queries are patched,
//! executed, and logged against it.

use sqlsense::config::Config;
use sqlsense::db::{MockDatabaseClient, Value};
use sqlsense::error::SqlSenseError;
use sqlsense::metadata::ColumnDef;
use sqlsense::service::QueryService;
use std::sync::Arc;

const CONN: &str = "mock://shop";

/// Two tables: 12 users and 1000 orders with three distinct statuses.
///
/// The `status` column has a tiny distinct ratio, well under the default
/// admission threshold, so its values land in the embedding cache. The
/// `name` column is fully distinct and stays out of it.
fn shop_client() -> MockDatabaseClient {
    let users: Vec<Vec<Value>> = (1..=12)
        .map(|i| {
            vec![
                Value::Int(i),
                Value::String(format!("user-{i}")),
            ]
        })
        .collect();

    let statuses = ["shipped", "pending", "cancelled"];
    let orders: Vec<Vec<Value>> = (1..=1000)
        .map(|i| {
            vec![
                Value::Int(i),
                Value::Int((i - 1) % 12 + 1),
                Value::String(statuses[(i as usize - 1) % 3].to_string()),
            ]
        })
        .collect();

    MockDatabaseClient::new()
        .with_table(
            "users",
            vec![
                ColumnDef::new("id", "integer").nullable(false),
                ColumnDef::new("name", "varchar(50)"),
            ],
            users,
        )
        .with_table(
            "orders",
            vec![
                ColumnDef::new("id", "integer").nullable(false),
                ColumnDef::new("user_id", "integer"),
                ColumnDef::new("status", "varchar(20)"),
            ],
            orders,
        )
}

fn service_with_shop() -> QueryService {
    let service = QueryService::with_default_model(Config::default());
    service.registry().register(CONN, Arc::new(shop_client()));
    service
}

#[tokio::test]
async fn test_validate_builds_metadata_and_embeddings() {
    let service = service_with_shop();

    let metadata = service.validate_connection(CONN).await.unwrap();

    assert_eq!(metadata.schema.len(), 2);
    assert!(metadata.schema.contains_key("users"));
    assert!(metadata.schema.contains_key("orders"));
    assert_eq!(metadata.row_count("orders"), 1000);
    assert_eq!(metadata.cardinality("orders", "status"), Some(0.003));

    // Low-cardinality text values were embedded; fully distinct ones were not.
    let store = service.embedding_store();
    assert_eq!(store.bucket_len(CONN, "orders", "status"), 3);
    assert_eq!(store.bucket_len(CONN, "users", "name"), 0);
}

#[tokio::test]
async fn test_get_metadata_miss_then_hit() {
    let service = service_with_shop();

    assert!(service.get_metadata(CONN).is_none());

    let built = service.validate_connection(CONN).await.unwrap();
    let cached = service.get_metadata(CONN).unwrap();
    assert!(Arc::ptr_eq(&built, &cached));

    // Re-validation reuses the cached metadata.
    let again = service.validate_connection(CONN).await.unwrap();
    assert!(Arc::ptr_eq(&built, &again));
}

#[tokio::test]
async fn test_run_query_corrects_typo_end_to_end() {
    let service = service_with_shop();
    service.validate_connection(CONN).await.unwrap();

    let outcome = service
        .run_query(CONN, "SELECT * FROM orders WHERE status = 'Shiped'")
        .await
        .unwrap();

    // The misspelled literal was corrected, so only shipped orders come back.
    assert_eq!(outcome.result.row_count(), 334);
    let status_idx = outcome
        .result
        .columns
        .iter()
        .position(|c| c.name == "status")
        .unwrap();
    for row in &outcome.result.rows {
        assert_eq!(row[status_idx], Value::String("shipped".to_string()));
    }
}

#[tokio::test]
async fn test_run_query_known_value_untouched() {
    let service = service_with_shop();
    service.validate_connection(CONN).await.unwrap();

    let outcome = service
        .run_query(CONN, "SELECT * FROM orders WHERE orders.status = 'pending'")
        .await
        .unwrap();

    assert_eq!(outcome.result.row_count(), 333);
}

#[tokio::test]
async fn test_query_log_aggregates_repeated_statements() {
    let service = service_with_shop();
    service.validate_connection(CONN).await.unwrap();

    let sql = "SELECT * FROM orders WHERE orders.status = 'Shiped'";
    service.run_query(CONN, sql).await.unwrap();
    service.run_query(CONN, sql).await.unwrap();

    let log = service.query_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].frequency, 2);
    // The log records the patched statement.
    assert!(log[0].statement.contains("'shipped'"));
    assert!(log[0].where_columns.contains("status"));
}

#[tokio::test]
async fn test_run_query_without_validation_still_executes() {
    let service = service_with_shop();

    // No caches built yet, so the typo survives patching and matches nothing.
    let outcome = service
        .run_query(CONN, "SELECT * FROM orders WHERE orders.status = 'Shiped'")
        .await
        .unwrap();
    assert_eq!(outcome.result.row_count(), 0);
}

#[tokio::test]
async fn test_validate_rejects_unsupported_scheme() {
    let service = QueryService::with_default_model(Config::default());

    let result = service.validate_connection("mysql://localhost/db").await;
    assert!(matches!(result, Err(SqlSenseError::Connection(_))));
}

#[tokio::test]
async fn test_shutdown_clears_registry() {
    let service = service_with_shop();
    service.validate_connection(CONN).await.unwrap();
    assert!(!service.registry().is_empty());

    service.shutdown().await;
    assert!(service.registry().is_empty());
}
