//! Container-lifecycle events emitted by an engine.

use async_trait::async_trait;

/// What happened on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ContainerCreated,
    ContainerDestroyed,
    ContainerDied,
    EngineDisconnected,
    EngineReconnected,
}

/// One event from one engine.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub engine_id: String,
    pub engine_name: String,
    pub kind: EventKind,
    /// Canonical container name, when the event concerns a container.
    pub container: Option<String>,
}

/// Receives engine events. Handler errors are telemetry failures:
/// they are logged by the dispatcher and never propagated.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EngineEvent) -> anyhow::Result<()>;
}
