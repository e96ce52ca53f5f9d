//! Configuration management for sqlsense.
//!
//! Handles loading configuration from TOML files, with defaulted tunables for
//! the semantic value cache and the connection pool.

use crate::error::{Result, SqlSenseError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for sqlsense.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Semantic value cache tunables.
    #[serde(default)]
    pub semantic: SemanticConfig,

    /// Connection pool tunables.
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Tunables for the embedding store and literal correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Minimum cosine similarity for a nearest-value substitution to apply.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Columns with a distinct/row-count ratio above this are never embedded.
    /// Higher means fewer columns are corrected; lower means slower validation
    /// and a larger cache.
    #[serde(default = "default_cardinality_threshold")]
    pub cardinality_threshold: f64,

    /// Hard cap on distinct values sampled per admitted column.
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,

    /// Tables with fewer rows than this are skipped entirely.
    #[serde(default = "default_min_row_count")]
    pub min_row_count: u64,

    /// Dimension of the embedding vectors.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_cardinality_threshold() -> f64 {
    0.4
}

fn default_sample_cap() -> usize {
    500
}

fn default_min_row_count() -> u64 {
    10
}

fn default_embedding_dimension() -> usize {
    256
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            cardinality_threshold: default_cardinality_threshold(),
            sample_cap: default_sample_cap(),
            min_row_count: default_min_row_count(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

/// Tunables for pooled database clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum pooled connections per connection string.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection before failing.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| SqlSenseError::config(format!("Cannot read config file: {e}")))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| SqlSenseError::config(format!("Invalid config file: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks tunables for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.semantic.similarity_threshold) {
            return Err(SqlSenseError::config(
                "semantic.similarity_threshold must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.semantic.cardinality_threshold) {
            return Err(SqlSenseError::config(
                "semantic.cardinality_threshold must be in [0, 1]",
            ));
        }
        if self.semantic.embedding_dimension == 0 {
            return Err(SqlSenseError::config(
                "semantic.embedding_dimension must be positive",
            ));
        }
        if self.pool.max_connections == 0 {
            return Err(SqlSenseError::config("pool.max_connections must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.semantic.similarity_threshold, 0.8);
        assert_eq!(config.semantic.cardinality_threshold, 0.4);
        assert_eq!(config.semantic.sample_cap, 500);
        assert_eq!(config.semantic.min_row_count, 10);
        assert_eq!(config.pool.max_connections, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load_from_file(Path::new("/nonexistent/sqlsense.toml")).unwrap();
        assert_eq!(config.semantic.sample_cap, 500);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[semantic]\nsimilarity_threshold = 0.9\ncardinality_threshold = 0.2"
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.semantic.similarity_threshold, 0.9);
        assert_eq!(config.semantic.cardinality_threshold, 0.2);
        // Unspecified fields fall back to defaults
        assert_eq!(config.semantic.sample_cap, 500);
        assert_eq!(config.pool.max_connections, 5);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[semantic]\nsimilarity_threshold = 1.5").unwrap();

        let result = Config::load_from_file(file.path());
        assert!(matches!(result, Err(SqlSenseError::Config(_))));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();

        let result = Config::load_from_file(file.path());
        assert!(matches!(result, Err(SqlSenseError::Config(_))));
    }
}
