//! Cluster error types.

use thiserror::Error;

use crate::discovery::DiscoveryError;
use crate::scheduler::SchedulerError;
use muster_engine::EngineError;
use muster_state::StateError;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur during cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("intent store error: {0}")]
    State(#[from] StateError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("event handler already registered")]
    HandlerAlreadyRegistered,
}
