//! Membership registry — the set of known engines.
//!
//! Keyed by driver-reported engine identity. Many readers, single
//! writer; the lock is held only for map access and snapshot copies,
//! never across I/O.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;

use muster_engine::Engine;
use muster_state::EngineId;

/// The engine membership map.
#[derive(Default)]
pub struct Registry {
    engines: RwLock<HashMap<EngineId, Arc<Engine>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an engine unless its id is already registered.
    ///
    /// On collision the incumbent wins: the duplicate is logged
    /// (distinguishing a reused id from a re-announced address) and the
    /// newcomer is dropped. Returns whether the engine was inserted.
    pub async fn insert_if_absent(&self, engine: Arc<Engine>) -> bool {
        let mut engines = self.engines.write().await;
        if let Some(existing) = engines.get(engine.id()) {
            if existing.addr() != engine.addr() {
                error!(
                    id = %engine.id(),
                    existing = %existing.addr(),
                    new = %engine.addr(),
                    "engine id duplicated by two addresses"
                );
            } else {
                error!(
                    name = %engine.name(),
                    addr = %engine.addr(),
                    "engine is already registered"
                );
            }
            return false;
        }
        engines.insert(engine.id().to_string(), engine);
        true
    }

    /// Whether any registered engine uses this address.
    pub async fn contains_addr(&self, addr: &str) -> bool {
        let engines = self.engines.read().await;
        engines.values().any(|e| e.addr() == addr)
    }

    /// Look up an engine by id.
    pub async fn get(&self, id: &str) -> Option<Arc<Engine>> {
        let engines = self.engines.read().await;
        engines.get(id).cloned()
    }

    /// Snapshot of every registered engine.
    pub async fn snapshot_all(&self) -> Vec<Arc<Engine>> {
        let engines = self.engines.read().await;
        engines.values().cloned().collect()
    }

    /// Snapshot filtered to currently healthy engines.
    pub async fn snapshot_healthy(&self) -> Vec<Arc<Engine>> {
        let engines = self.engines.read().await;
        engines
            .values()
            .filter(|e| e.is_healthy())
            .cloned()
            .collect()
    }

    /// Number of registered engines.
    pub async fn len(&self) -> usize {
        self.engines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
