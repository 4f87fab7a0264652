//! The engine driver contract.
//!
//! The driver performs container lifecycle operations against one
//! remote container host. It is a consumed collaborator: the core
//! never implements it, only calls it. Drivers must be cheap to clone
//! behind an `Arc` and safe to call concurrently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use muster_state::{ContainerId, ContainerSpec};

use crate::error::DriverResult;

/// Static facts a host reports on first contact.
#[derive(Debug, Clone, Default)]
pub struct DriverInfo {
    /// Opaque stable engine identity.
    pub id: String,
    /// Display name of the host.
    pub name: String,
    /// Host labels for scheduling affinity.
    pub labels: HashMap<String, String>,
    /// Total CPU count.
    pub cpus: u64,
    /// Total memory in bytes.
    pub memory_bytes: u64,
}

/// One container as reported by the driver's inventory listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    /// Slash-prefixed names; the first one is canonical.
    pub names: Vec<String>,
    pub running: bool,
    /// The spec the container was created from.
    pub spec: ContainerSpec,
}

/// One image as reported by the driver's inventory listing.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
}

/// TLS material for the driver connection. Plumbed through to the
/// driver untouched; the core never reads these files.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub ca_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Lifecycle operations against one container host.
#[async_trait]
pub trait EngineDriver: Send + Sync {
    /// Identity and capacity of the host.
    async fn info(&self) -> DriverResult<DriverInfo>;

    /// Liveness probe. An `Err` counts as a failed health check.
    async fn ping(&self) -> DriverResult<()>;

    /// Current container inventory.
    async fn list_containers(&self) -> DriverResult<Vec<ContainerSummary>>;

    /// Current image inventory.
    async fn list_images(&self) -> DriverResult<Vec<ImageSummary>>;

    /// Create a container; returns the engine-assigned id.
    async fn create_container(&self, spec: &ContainerSpec, name: &str)
        -> DriverResult<ContainerId>;

    /// Start a container by name.
    async fn start_container(&self, name: &str) -> DriverResult<()>;

    /// Remove a container. Irrevocable.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> DriverResult<()>;

    /// Pull an image onto the host.
    async fn pull_image(&self, image: &str) -> DriverResult<()>;

    /// Remove an image from the host.
    async fn remove_image(&self, image: &str) -> DriverResult<()>;
}

/// Builds driver connections for engine addresses.
///
/// Injected into the cluster so discovery can connect newly found
/// engines without the core knowing the transport.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Establish a driver connection to `addr` (`host:port`).
    async fn connect(
        &self,
        addr: &str,
        tls: Option<&TlsConfig>,
    ) -> DriverResult<Arc<dyn EngineDriver>>;
}
