//! The engine handle — a connected client to one container host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use muster_state::{ContainerId, ContainerSpec};

use crate::container::{Container, Image};
use crate::driver::{DriverFactory, DriverInfo, EngineDriver, TlsConfig};
use crate::error::{DriverError, EngineError, EngineResult};
use crate::event::{EngineEvent, EventHandler, EventKind};
use crate::health::HealthTracker;
use crate::queue::RequestQueue;

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// A connected container-host engine.
///
/// Created on first discovery of an address, connected via an injected
/// driver, and registered with the cluster under the driver-reported
/// identity. Engines are never removed, only marked unhealthy by the
/// refresh loop.
pub struct Engine {
    addr: String,
    overcommit: f64,
    refresh_interval: Duration,
    failure_threshold: u32,
    identity: OnceLock<DriverInfo>,
    driver: OnceLock<Arc<dyn EngineDriver>>,
    healthy: AtomicBool,
    containers: RwLock<HashMap<ContainerId, Arc<Container>>>,
    images: RwLock<Vec<Arc<Image>>>,
    queue: RequestQueue,
    handler: OnceLock<Arc<dyn EventHandler>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    /// Self-reference for container back-pointers and the refresh
    /// loop; set by [`Engine::shared`].
    me: Weak<Engine>,
}

impl Engine {
    /// Create an unconnected engine handle for `addr` (`host:port`).
    ///
    /// `overcommit` scales the advertised capacity, e.g. `0.05` lets
    /// the scheduler reserve 5% beyond the physical totals.
    pub fn new(addr: impl Into<String>, overcommit: f64) -> Self {
        Self {
            addr: addr.into(),
            overcommit,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            identity: OnceLock::new(),
            driver: OnceLock::new(),
            healthy: AtomicBool::new(false),
            containers: RwLock::new(HashMap::new()),
            images: RwLock::new(Vec::new()),
            queue: RequestQueue::new(),
            handler: OnceLock::new(),
            shutdown_tx: Mutex::new(None),
            me: Weak::new(),
        }
    }

    /// Set the refresh loop cadence.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set how many consecutive failed probes flip the engine unhealthy.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Finish construction. Engines are always used behind an `Arc`:
    /// containers keep weak back-references and the refresh loop holds
    /// a weak handle so a dropped engine winds down on its own.
    pub fn shared(self) -> Arc<Engine> {
        Arc::new_cyclic(|weak| {
            let mut engine = self;
            engine.me = weak.clone();
            engine
        })
    }

    // ── Identity & capacity ─────────────────────────────────────────

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Driver-reported identity; empty until connected.
    pub fn id(&self) -> &str {
        self.identity.get().map(|i| i.id.as_str()).unwrap_or("")
    }

    /// Display name; falls back to the address until connected.
    pub fn name(&self) -> &str {
        self.identity
            .get()
            .map(|i| i.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.addr)
    }

    pub fn labels(&self) -> HashMap<String, String> {
        self.identity
            .get()
            .map(|i| i.labels.clone())
            .unwrap_or_default()
    }

    /// Total schedulable CPUs, overcommit applied.
    pub fn total_cpus(&self) -> u64 {
        let cpus = self.identity.get().map(|i| i.cpus).unwrap_or(0);
        (cpus as f64 * (1.0 + self.overcommit)) as u64
    }

    /// Total schedulable memory in bytes, overcommit applied.
    pub fn total_memory(&self) -> u64 {
        let memory = self.identity.get().map(|i| i.memory_bytes).unwrap_or(0);
        (memory as f64 * (1.0 + self.overcommit)) as u64
    }

    /// Sum of CPU shares reserved by the current inventory.
    pub fn used_cpus(&self) -> f64 {
        let containers = self.containers.read().unwrap();
        containers.values().map(|c| c.spec.cpu_shares).sum()
    }

    /// Sum of memory bytes reserved by the current inventory.
    pub fn used_memory(&self) -> u64 {
        let containers = self.containers.read().unwrap();
        containers.values().map(|c| c.spec.memory_bytes).sum()
    }

    /// Health snapshot from the last probe. Never blocks on I/O.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.driver.get().is_some()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Establish the driver connection, seed the inventory, and spawn
    /// the refresh loop.
    pub async fn connect(
        &self,
        factory: &dyn DriverFactory,
        tls: Option<&TlsConfig>,
    ) -> EngineResult<()> {
        let driver = factory
            .connect(&self.addr, tls)
            .await
            .map_err(|e| EngineError::Connect {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;

        let driver_info = driver.info().await.map_err(|e| EngineError::Connect {
            addr: self.addr.clone(),
            reason: e.to_string(),
        })?;

        if self.identity.set(driver_info).is_err() {
            return Err(EngineError::Connect {
                addr: self.addr.clone(),
                reason: "engine already connected".to_string(),
            });
        }
        let _ = self.driver.set(driver);

        self.sync_inventory(false).await?;
        self.healthy.store(true, Ordering::SeqCst);
        self.spawn_refresh_loop();

        info!(id = %self.id(), name = %self.name(), addr = %self.addr, "engine connected");
        Ok(())
    }

    /// Subscribe to container-lifecycle events from this engine.
    ///
    /// One-shot: a second call fails with
    /// [`EngineError::HandlerAlreadyRegistered`].
    pub fn register_event_handler(&self, handler: Arc<dyn EventHandler>) -> EngineResult<()> {
        self.handler
            .set(handler)
            .map_err(|_| EngineError::HandlerAlreadyRegistered)
    }

    /// Enqueue a create intent ahead of the actual `create` call.
    pub fn add_to_queue(&self, spec: ContainerSpec, name: &str) {
        self.queue.enqueue(name, spec);
    }

    /// Create a container on this engine.
    ///
    /// Holds the engine's request-queue order lock so concurrent
    /// creates serialize. When the image is missing and
    /// `pull_if_missing` is set, pulls it and retries once.
    pub async fn create(
        &self,
        spec: ContainerSpec,
        name: &str,
        pull_if_missing: bool,
    ) -> EngineResult<Arc<Container>> {
        let driver = self.driver()?.clone();
        let _order = self.queue.order().await;
        let _ = self.queue.take(name);

        let id = match driver.create_container(&spec, name).await {
            Err(DriverError::ImageMissing(image)) if pull_if_missing => {
                debug!(%image, %name, "image missing, pulling before create");
                driver.pull_image(&spec.image).await?;
                driver.create_container(&spec, name).await?
            }
            other => other?,
        };

        let container = Arc::new(Container::new(
            id.clone(),
            vec![format!("/{name}")],
            false,
            spec,
            self.me.clone(),
        ));
        self.containers
            .write()
            .unwrap()
            .insert(id, container.clone());

        self.emit(EventKind::ContainerCreated, Some(name)).await;
        Ok(container)
    }

    /// Destroy a container. Irrevocable.
    pub async fn destroy(&self, container: &Container, force: bool) -> EngineResult<()> {
        let driver = self.driver()?.clone();
        driver.remove_container(&container.id, force).await?;
        self.containers.write().unwrap().remove(&container.id);
        self.emit(EventKind::ContainerDestroyed, Some(container.canonical_name()))
            .await;
        Ok(())
    }

    /// Start a container by name.
    pub async fn start(&self, name: &str) -> EngineResult<()> {
        let driver = self.driver()?.clone();
        driver.start_container(name).await?;
        if let Some(container) = self.container(name) {
            container.set_running(true);
        }
        Ok(())
    }

    /// Pull an image onto this engine.
    pub async fn pull(&self, image: &str) -> EngineResult<()> {
        let driver = self.driver()?.clone();
        driver.pull_image(image).await?;
        self.sync_images().await?;
        Ok(())
    }

    /// Remove an image from this engine.
    pub async fn remove_image(&self, image: &str) -> EngineResult<()> {
        let driver = self.driver()?.clone();
        driver.remove_image(image).await?;
        self.sync_images().await?;
        Ok(())
    }

    // ── Inventory lookups ───────────────────────────────────────────

    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.containers.read().unwrap().values().cloned().collect()
    }

    pub fn container_count(&self) -> usize {
        self.containers.read().unwrap().len()
    }

    pub fn images(&self) -> Vec<Arc<Image>> {
        self.images.read().unwrap().clone()
    }

    /// Find a container by canonical name, any name, or id prefix.
    pub fn container(&self, id_or_name: &str) -> Option<Arc<Container>> {
        if id_or_name.is_empty() {
            return None;
        }
        let containers = self.containers.read().unwrap();
        containers.values().find(|c| c.matches(id_or_name)).cloned()
    }

    /// Find an image by tag or id prefix.
    pub fn image(&self, id_or_name: &str) -> Option<Arc<Image>> {
        if id_or_name.is_empty() {
            return None;
        }
        let images = self.images.read().unwrap();
        images.iter().find(|i| i.matches(id_or_name)).cloned()
    }

    // ── Internal ────────────────────────────────────────────────────

    fn driver(&self) -> EngineResult<&Arc<dyn EngineDriver>> {
        self.driver.get().ok_or(EngineError::NotConnected)
    }

    /// Replace the inventories with the driver's current view,
    /// emitting lifecycle events for the differences when asked.
    async fn sync_inventory(&self, emit_events: bool) -> EngineResult<()> {
        let driver = self.driver()?.clone();
        let summaries = driver.list_containers().await?;

        let mut events: Vec<(EventKind, String)> = Vec::new();
        {
            let mut containers = self.containers.write().unwrap();
            let old: HashMap<ContainerId, (bool, String)> = containers
                .iter()
                .map(|(id, c)| (id.clone(), (c.is_running(), c.canonical_name().to_string())))
                .collect();

            let mut next = HashMap::with_capacity(summaries.len());
            for summary in summaries {
                match old.get(&summary.id) {
                    None => events.push((
                        EventKind::ContainerCreated,
                        summary
                            .names
                            .first()
                            .map(|n| n.trim_start_matches('/').to_string())
                            .unwrap_or_default(),
                    )),
                    Some((was_running, name)) if *was_running && !summary.running => {
                        events.push((EventKind::ContainerDied, name.clone()));
                    }
                    Some(_) => {}
                }
                let container = Arc::new(Container::new(
                    summary.id.clone(),
                    summary.names,
                    summary.running,
                    summary.spec,
                    self.me.clone(),
                ));
                next.insert(summary.id, container);
            }

            for (id, (_, name)) in &old {
                if !next.contains_key(id) {
                    events.push((EventKind::ContainerDestroyed, name.clone()));
                }
            }

            *containers = next;
        }

        self.sync_images().await?;

        if emit_events {
            for (kind, name) in events {
                self.emit(kind, Some(&name)).await;
            }
        }
        Ok(())
    }

    async fn sync_images(&self) -> EngineResult<()> {
        let driver = self.driver()?.clone();
        let summaries = driver.list_images().await?;
        let images = summaries
            .into_iter()
            .map(|s| Arc::new(Image::new(s.id, s.repo_tags, self.me.clone())))
            .collect();
        *self.images.write().unwrap() = images;
        Ok(())
    }

    /// Dispatch an event to the registered handler, if any.
    /// Handler errors are logged, never propagated.
    async fn emit(&self, kind: EventKind, container: Option<&str>) {
        let Some(handler) = self.handler.get() else {
            return;
        };
        let event = EngineEvent {
            engine_id: self.id().to_string(),
            engine_name: self.name().to_string(),
            kind,
            container: container.map(|c| c.to_string()),
        };
        if let Err(e) = handler.handle(&event).await {
            error!(engine = %self.name(), error = %e, "event handler failed");
        }
    }

    fn spawn_refresh_loop(&self) {
        let (tx, mut rx) = watch::channel(false);
        *self.shutdown_tx.lock().unwrap() = Some(tx);

        let weak = self.me.clone();
        let interval = self.refresh_interval;
        let threshold = self.failure_threshold;

        tokio::spawn(async move {
            let mut tracker = HealthTracker::new(threshold);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(engine) = weak.upgrade() else { break };
                        let Ok(driver) = engine.driver() else { break };
                        let driver = driver.clone();

                        let was_healthy = engine.is_healthy();
                        let healthy_now = match driver.ping().await {
                            Ok(()) => tracker.record_success(),
                            Err(e) => {
                                debug!(addr = %engine.addr, error = %e, "engine probe failed");
                                tracker.record_failure()
                            }
                        };
                        engine.healthy.store(healthy_now, Ordering::SeqCst);

                        if was_healthy && !healthy_now {
                            engine.emit(EventKind::EngineDisconnected, None).await;
                        } else if !was_healthy && healthy_now {
                            engine.emit(EventKind::EngineReconnected, None).await;
                        }

                        if healthy_now {
                            if let Err(e) = engine.sync_inventory(true).await {
                                debug!(addr = %engine.addr, error = %e, "inventory refresh failed");
                            }
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}
