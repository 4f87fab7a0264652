//! IntentStore — redb-backed persistence for placement intent.
//!
//! Records are JSON-serialized into redb's `&[u8]` value column, keyed
//! by container id. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::INTENTS;
use crate::types::{ContainerId, IntentRecord};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe intent store backed by redb.
#[derive(Clone)]
pub struct IntentStore {
    db: Arc<Database>,
}

impl IntentStore {
    /// Open (or create) a persistent intent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "intent store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory intent store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory intent store opened");
        Ok(store)
    }

    /// Create the intents table if it doesn't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INTENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update an intent record under its container id.
    pub fn add(&self, record: &IntentRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INTENTS).map_err(map_err!(Table))?;
            table
                .insert(record.table_key(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(container_id = %record.container_id, name = %record.name, "intent stored");
        Ok(())
    }

    /// Get an intent record by container id.
    pub fn get(&self, container_id: &str) -> StateResult<Option<IntentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INTENTS).map_err(map_err!(Table))?;
        match table.get(container_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: IntentRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Remove an intent record.
    ///
    /// Fails with [`StateError::NotFound`] when no record exists for
    /// the container id.
    pub fn remove(&self, container_id: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INTENTS).map_err(map_err!(Table))?;
            existed = table.remove(container_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if !existed {
            return Err(StateError::NotFound(container_id.to_string()));
        }
        debug!(%container_id, "intent removed");
        Ok(())
    }

    /// List all intent records.
    pub fn list(&self) -> StateResult<Vec<IntentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INTENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: IntentRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Whether a record exists for the container id.
    pub fn contains(&self, container_id: &ContainerId) -> StateResult<bool> {
        Ok(self.get(container_id)?.is_some())
    }
}
