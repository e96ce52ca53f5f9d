//! Connection registry.
//!
//! Keeps one pooled database client per distinct connection string for the
//! lifetime of the process. Creation is lazy and happens exactly once per
//! key, even under concurrent first use; the registry map lock is never held
//! across connect I/O.

use crate::config::PoolConfig;
use crate::db::{self, DatabaseClient};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::info;

type ClientCell = Arc<OnceCell<Arc<dyn DatabaseClient>>>;

/// Process-wide registry of pooled database clients keyed by connection
/// string.
pub struct ConnectionRegistry {
    pool_config: PoolConfig,
    clients: RwLock<HashMap<String, ClientCell>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new(pool_config: PoolConfig) -> Self {
        Self {
            pool_config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the client for `conn_str`, creating it on first use.
    ///
    /// Concurrent callers for the same key share a single initialization; a
    /// failed initialization leaves the cell empty so a later call can retry.
    pub async fn get(&self, conn_str: &str) -> Result<Arc<dyn DatabaseClient>> {
        let cell = self.cell_for(conn_str);

        let client = cell
            .get_or_try_init(|| db::connect(conn_str, &self.pool_config))
            .await?;

        Ok(Arc::clone(client))
    }

    /// Injects a pre-built client for `conn_str` (tests and mock mode).
    ///
    /// Has no effect when a client already exists for the key.
    pub fn register(&self, conn_str: &str, client: Arc<dyn DatabaseClient>) {
        let cell = self.cell_for(conn_str);
        let _ = cell.set(client);
    }

    /// Number of distinct connection strings seen.
    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// Returns true if no connections have been registered.
    pub fn is_empty(&self) -> bool {
        self.clients.read().unwrap().is_empty()
    }

    /// Closes every pooled client and clears the registry. Called once at
    /// shutdown.
    pub async fn dispose_all(&self) {
        let cells: Vec<ClientCell> = {
            let mut map = self.clients.write().unwrap();
            map.drain().map(|(_, cell)| cell).collect()
        };

        for cell in cells {
            if let Some(client) = cell.get() {
                if let Err(e) = client.close().await {
                    info!("Error closing connection: {e}");
                }
            }
        }
    }

    fn cell_for(&self, conn_str: &str) -> ClientCell {
        if let Some(cell) = self.clients.read().unwrap().get(conn_str) {
            return Arc::clone(cell);
        }

        let mut map = self.clients.write().unwrap();
        Arc::clone(
            map.entry(conn_str.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }
}
