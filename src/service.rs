//! Caller-facing service layer.
//!
//! Wires the registry, metadata cache, embedding store, patcher, executor,
//! and query log into the three operations consumed by the HTTP layer:
//! validate a connection (which builds both caches as a side effect), run a
//! query (patching and logging as side effects), and fetch cached metadata.

use crate::config::Config;
use crate::error::Result;
use crate::metadata::{Metadata, MetadataCache};
use crate::query::{QueryExecutor, QueryLogEntry, QueryLogger, QueryOutcome, QueryPatcher};
use crate::registry::ConnectionRegistry;
use crate::semantic::{EmbeddingModel, EmbeddingStore, NgramEmbedder};
use std::sync::Arc;
use tracing::info;

/// Shared entry point for request-handling code.
///
/// All contained services are process-wide and internally synchronized; a
/// `QueryService` is cheap to share behind an `Arc`.
pub struct QueryService {
    config: Config,
    registry: Arc<ConnectionRegistry>,
    metadata_cache: Arc<MetadataCache>,
    store: Arc<EmbeddingStore>,
    logger: Arc<QueryLogger>,
    patcher: QueryPatcher,
    executor: QueryExecutor,
}

impl QueryService {
    /// Builds a service around an embedding model. The model is loaded once
    /// here and shared for the process lifetime.
    pub fn new(config: Config, model: Arc<dyn EmbeddingModel>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.pool.clone()));
        let metadata_cache = Arc::new(MetadataCache::new());
        let store = Arc::new(EmbeddingStore::new(model, config.semantic.clone()));
        let logger = Arc::new(QueryLogger::new());

        let patcher = QueryPatcher::new(Arc::clone(&store), config.semantic.similarity_threshold);
        let executor = QueryExecutor::new(Arc::clone(&logger));

        Self {
            config,
            registry,
            metadata_cache,
            store,
            logger,
            patcher,
            executor,
        }
    }

    /// Builds a service with the default n-gram embedder.
    pub fn with_default_model(config: Config) -> Self {
        let dimension = config.semantic.embedding_dimension;
        Self::new(config, Arc::new(NgramEmbedder::new(dimension)))
    }

    /// Validates a connection and, as a side effect, builds the metadata
    /// cache and populates the embedding cache for it.
    pub async fn validate_connection(&self, conn_str: &str) -> Result<Arc<Metadata>> {
        let client = self.registry.get(conn_str).await?;
        client.ping().await?;

        let metadata = self.metadata_cache.get_or_build(conn_str, &*client).await?;

        self.store
            .populate(
                &*client,
                conn_str,
                &metadata,
                self.config.semantic.cardinality_threshold,
            )
            .await;

        info!("Validated connection with {} tables", metadata.schema.len());
        Ok(metadata)
    }

    /// Patches and executes one or more statements, with logging side
    /// effects.
    pub async fn run_query(&self, conn_str: &str, sql: &str) -> Result<QueryOutcome> {
        let client = self.registry.get(conn_str).await?;
        let patched = self.patcher.patch(conn_str, sql);
        self.executor.execute(&*client, &patched).await
    }

    /// Returns cached metadata for a previously validated connection.
    pub fn get_metadata(&self, conn_str: &str) -> Option<Arc<Metadata>> {
        self.metadata_cache.get(conn_str)
    }

    /// Snapshot of the per-statement execution log.
    pub fn query_log(&self) -> Vec<QueryLogEntry> {
        self.logger.entries()
    }

    /// The connection registry (tests inject mock clients through this).
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The embedding store, shared with the patcher.
    pub fn embedding_store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    /// Closes every pooled connection. Called once at shutdown.
    pub async fn shutdown(&self) {
        info!("Shutting down, closing all database connections");
        self.registry.dispose_all().await;
    }
}
