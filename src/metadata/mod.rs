//! Schema and statistics metadata.
//!
//! `Metadata` is the unit cached per connection string: the introspected
//! schema of every table plus per-table row counts and per-column cardinality
//! ratios. It is built once at connection validation and is immutable for the
//! lifetime of the process; callers re-validate to pick up schema changes.

mod cache;
mod extractor;

pub use cache::MetadataCache;
pub use extractor::SchemaExtractor;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema plus statistics for one database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Table name to table schema.
    pub schema: BTreeMap<String, TableSchema>,

    /// Table name to table statistics.
    pub stats: BTreeMap<String, TableStats>,
}

/// Structure of a single table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,

    /// Foreign key constraints on this table.
    pub foreign_keys: Vec<ForeignKey>,

    /// Indexes on this table.
    pub indexes: Vec<Index>,
}

/// A column as declared in the database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// Declared type name (e.g., "integer", "character varying").
    pub data_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,
}

impl ColumnDef {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }
}

/// A foreign key constraint: local columns referencing another table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constrained columns on this table.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub referenced_table: String,

    /// Referenced columns, positionally matching `columns`.
    pub referenced_columns: Vec<String>,
}

/// An index on a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Column names included in the index.
    pub columns: Vec<String>,

    /// Whether this is a unique index.
    pub is_unique: bool,
}

/// Row count and per-column cardinality for one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableStats {
    /// Full row count.
    pub row_count: u64,

    /// Column name to distinct/row-count ratio in [0, 1]. A column whose
    /// stats could not be computed is absent from this map.
    pub cardinality: BTreeMap<String, f64>,
}

impl Metadata {
    /// Looks up the cardinality ratio for a column, if computed.
    pub fn cardinality(&self, table: &str, column: &str) -> Option<f64> {
        self.stats.get(table)?.cardinality.get(column).copied()
    }

    /// Looks up the row count for a table, defaulting to 0 when unknown.
    pub fn row_count(&self, table: &str) -> u64 {
        self.stats.get(table).map(|s| s.row_count).unwrap_or(0)
    }
}
