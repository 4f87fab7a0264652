//! muster-engine — the handle to one container-host engine.
//!
//! An [`Engine`] wraps a connected driver and keeps an in-memory view
//! of the host: identity, labels, capacity, the container and image
//! inventories, and a health flag fed by a background refresh loop.
//!
//! # Architecture
//!
//! ```text
//! Engine
//!   ├── EngineDriver (injected; create/start/destroy/pull over the wire)
//!   ├── refresh loop (ping → HealthTracker → healthy flag,
//!   │                 inventory sync → lifecycle events)
//!   ├── RequestQueue (per-engine writer-ordering point for creates)
//!   └── EventHandler (one-shot registration, errors logged + swallowed)
//! ```
//!
//! Health probing is the engine's own responsibility: consumers only
//! ever read the non-blocking [`Engine::is_healthy`] snapshot.

pub mod container;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod health;
pub mod queue;

pub use container::{Container, Image};
pub use driver::{
    ContainerSummary, DriverFactory, DriverInfo, EngineDriver, ImageSummary, TlsConfig,
};
pub use engine::Engine;
pub use error::{DriverError, DriverResult, EngineError, EngineResult};
pub use event::{EngineEvent, EventHandler, EventKind};
