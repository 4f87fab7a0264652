//! muster-cluster — the cluster orchestration core.
//!
//! Discovers a dynamic set of container-host engines, tracks their
//! health, places container workloads through an injected scheduling
//! policy, and reschedules workloads off engines that fail.
//!
//! # Architecture
//!
//! ```text
//! Cluster (placement coordinator)
//!   ├── Registry            engine-id → Engine, read-locked snapshots
//!   ├── discovery ingress   entries → connect → insert-if-absent
//!   ├── health monitor      healthy/unhealthy sets, failover + adjust
//!   ├── MetaIndex           name → {spec, current, previous}
//!   ├── IntentStore         durable container_id → IntentRecord
//!   └── Scheduler           injected policy, select over healthy nodes
//! ```
//!
//! The scheduling mutex serializes placement decisions cluster-wide;
//! it covers node selection and the meta-placement update, and is
//! released before the blocking driver create so other placements can
//! proceed.

pub mod cluster;
pub mod config;
pub mod discovery;
pub mod error;
mod info;
pub mod meta;
mod monitor;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testutil;

pub use cluster::{Cluster, ClusterHandle, PullProgress};
pub use config::ClusterConfig;
pub use discovery::{DiscoveryError, DiscoveryProvider, Entry};
pub use error::{ClusterError, ClusterResult};
pub use meta::MetaPlacement;
pub use registry::Registry;
pub use scheduler::{Node, Scheduler, SchedulerError};
