//! Domain types shared across the Muster crates.
//!
//! A `ContainerSpec` is opaque to the orchestration core: it is handed
//! verbatim to the engine driver and stored durably. The only fields
//! the core reads are the image reference (for pull-on-missing) and the
//! resource requests (for reservation accounting).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque, stable identifier reported by an engine on first contact.
pub type EngineId = String;

/// Engine-assigned container identifier.
pub type ContainerId = String;

/// Requested container configuration plus host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerSpec {
    /// Image reference, e.g. `registry/app:tag`.
    pub image: String,
    /// Command and arguments.
    pub cmd: Vec<String>,
    /// Environment entries in `KEY=value` form.
    pub env: Vec<String>,
    /// Labels attached to the container.
    pub labels: HashMap<String, String>,
    /// Requested CPU share, fractional cores.
    pub cpu_shares: f64,
    /// Requested memory in bytes.
    pub memory_bytes: u64,
    /// Host-side configuration, applied by the driver at start.
    pub host: HostSpec,
}

/// Host configuration for a container.
///
/// Captured at create time so a reschedule can replay it; the core
/// never interprets these fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostSpec {
    /// Bind mounts in `host:container` form.
    pub binds: Vec<String>,
    /// Published ports in `host:container` form.
    pub port_bindings: Vec<String>,
    /// Restart policy name ("no", "always", ...).
    pub restart_policy: String,
    /// Run with elevated privileges.
    pub privileged: bool,
}

/// The durable record of a requested container placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentRecord {
    /// Engine-assigned container id; also the store key.
    pub container_id: ContainerId,
    /// Canonical container name.
    pub name: String,
    /// The spec the container was created from.
    pub spec: ContainerSpec,
}

impl IntentRecord {
    /// Build the key for the intents table.
    pub fn table_key(&self) -> &str {
        &self.container_id
    }
}
