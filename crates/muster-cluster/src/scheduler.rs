//! The scheduling policy seam.
//!
//! The policy (strategy + filters) is a consumed collaborator: the
//! cluster hands it a snapshot of the healthy topology and a spec and
//! gets back the chosen node. Placement decisions are serialized by the
//! cluster's placement lock, so implementations can stay lock-free.

use std::collections::HashMap;

use thiserror::Error;

use muster_engine::Engine;
use muster_state::{ContainerSpec, EngineId};

/// Errors from the scheduling policy.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no resources available to schedule container")]
    NoNodeAvailable,

    #[error("scheduling policy error: {0}")]
    Policy(String),
}

/// Scheduler-facing snapshot of one engine.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: EngineId,
    pub name: String,
    pub addr: String,
    pub labels: HashMap<String, String>,
    pub total_cpus: u64,
    pub total_memory: u64,
    pub used_cpus: f64,
    pub used_memory: u64,
    pub container_count: usize,
}

impl Node {
    /// Snapshot an engine's identity and reservations.
    pub fn from_engine(engine: &Engine) -> Self {
        Self {
            id: engine.id().to_string(),
            name: engine.name().to_string(),
            addr: engine.addr().to_string(),
            labels: engine.labels(),
            total_cpus: engine.total_cpus(),
            total_memory: engine.total_memory(),
            used_cpus: engine.used_cpus(),
            used_memory: engine.used_memory(),
            container_count: engine.container_count(),
        }
    }
}

/// Picks an engine for a container spec.
pub trait Scheduler: Send + Sync {
    /// Select a node for the spec from the healthy topology snapshot.
    ///
    /// Fails with [`SchedulerError::NoNodeAvailable`] when no node
    /// passes the policy's filters.
    fn select_node(&self, nodes: &[Node], spec: &ContainerSpec) -> Result<Node, SchedulerError>;

    /// Strategy name, for `info` output.
    fn strategy(&self) -> &str;

    /// Comma-joined filter names, for `info` output.
    fn filters(&self) -> String;
}
