//! sqlsense - metadata, semantic literal correction, and query analytics
//! for SQL-generating assistants.
//!
//! The crate maintains three process-wide caches keyed by connection string:
//! pooled database clients, introspected schema/statistics metadata, and
//! embeddings of low-cardinality text values. Incoming SQL is patched against
//! the embedding cache (misspelled string literals in WHERE equalities are
//! replaced by their nearest known value), executed inside a transaction, and
//! recorded in an aggregated per-statement log.
//!
//! [`service::QueryService`] ties the pieces together and is the intended
//! entry point for embedding this crate in a server.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod query;
pub mod registry;
pub mod semantic;
pub mod service;
