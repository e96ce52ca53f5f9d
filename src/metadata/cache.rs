//! Metadata memoization per connection string.
//!
//! No TTL and no invalidation: a stored `Metadata` lives for the process
//! lifetime, and callers re-validate the connection to pick up schema
//! changes.

use crate::db::DatabaseClient;
use crate::error::Result;
use crate::metadata::{Metadata, SchemaExtractor};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Process-wide cache of extracted metadata keyed by connection string.
#[derive(Debug, Default)]
pub struct MetadataCache {
    extractor: SchemaExtractor,
    entries: RwLock<HashMap<String, Arc<Metadata>>>,
}

impl MetadataCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached metadata for `conn_str`, if present.
    pub fn get(&self, conn_str: &str) -> Option<Arc<Metadata>> {
        self.entries.read().unwrap().get(conn_str).cloned()
    }

    /// Returns cached metadata, running extraction on a miss.
    ///
    /// Extraction runs without holding the cache lock, so two concurrent
    /// misses may both extract; the first insert wins and both callers see
    /// the same stored value afterwards.
    pub async fn get_or_build(
        &self,
        conn_str: &str,
        client: &dyn DatabaseClient,
    ) -> Result<Arc<Metadata>> {
        if let Some(metadata) = self.get(conn_str) {
            return Ok(metadata);
        }

        let metadata = Arc::new(self.extractor.extract(client).await?);

        let mut entries = self.entries.write().unwrap();
        Ok(Arc::clone(
            entries
                .entry(conn_str.to_string())
                .or_insert_with(|| metadata),
        ))
    }
}
