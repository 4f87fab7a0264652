//! Meta-placement index.
//!
//! In-memory map from canonical container name to the engine that
//! currently holds the placement and the one that held it before the
//! last reschedule. Failover reads it to replay a workload onto a new
//! engine; adjust reads it to clean the stale copy off the old one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use muster_engine::Engine;
use muster_state::ContainerSpec;

/// One placement record.
#[derive(Clone)]
pub struct MetaPlacement {
    pub spec: ContainerSpec,
    /// Engine that most recently received the placement.
    pub current: Arc<Engine>,
    /// Holder before the last reschedule; equals `current` when the
    /// placement was never rescheduled.
    pub previous: Arc<Engine>,
}

impl MetaPlacement {
    /// Whether the placement has moved since it was last created.
    pub fn rescheduled(&self) -> bool {
        !Arc::ptr_eq(&self.previous, &self.current)
    }
}

/// The name → placement map.
#[derive(Default)]
pub struct MetaIndex {
    entries: Mutex<HashMap<String, MetaPlacement>>,
}

impl MetaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a placement for `name` on `engine`.
    ///
    /// First placement sets `previous == current`; later placements
    /// shift `previous ← current`, `current ← engine`.
    pub fn record(&self, name: &str, spec: &ContainerSpec, engine: &Arc<Engine>) {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(name) {
            Some(meta) => {
                meta.previous = meta.current.clone();
                meta.current = engine.clone();
                meta.spec = spec.clone();
            }
            None => {
                entries.insert(
                    name.to_string(),
                    MetaPlacement {
                        spec: spec.clone(),
                        current: engine.clone(),
                        previous: engine.clone(),
                    },
                );
            }
        }
    }

    /// Look up a placement by canonical name.
    pub fn get(&self, name: &str) -> Option<MetaPlacement> {
        self.entries.lock().unwrap().get(name).cloned()
    }

    /// Drop the placement for `name`.
    pub fn remove(&self, name: &str) {
        self.entries.lock().unwrap().remove(name);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
