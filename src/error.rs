//! Error types for sqlsense.
//!
//! Defines the main error enum used throughout the crate. Every component
//! converts failures into one of these variants at its own boundary; partial
//! failures (stats, sampling, logging) are logged and degraded instead of
//! surfacing here.

use thiserror::Error;

/// Main error type for sqlsense operations.
#[derive(Error, Debug)]
pub enum SqlSenseError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// SQL parse errors that cannot be degraded to pass-through behavior.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Embedding model errors (encode failures, bad model state).
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SqlSenseError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates an embedding error with the given message.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Parse(_) => "Parse Error",
            Self::Embedding(_) => "Embedding Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<serde_json::Error> for SqlSenseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization failed: {e}"))
    }
}

/// Result type alias using SqlSenseError.
pub type Result<T> = std::result::Result<T, SqlSenseError>;
