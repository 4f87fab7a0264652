//! The placement coordinator.
//!
//! `Cluster` ties the membership registry, the scheduling policy, the
//! engine handles, the meta-placement index, and the intent store into
//! the public operation surface: create, remove, start, pull, and the
//! aggregate queries.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use muster_engine::{
    Container, DriverFactory, Engine, EngineEvent, EventHandler, Image,
};
use muster_state::{ContainerSpec, EngineId, IntentRecord, IntentStore};

use crate::config::ClusterConfig;
use crate::discovery::{self, DiscoveryProvider};
use crate::error::{ClusterError, ClusterResult};
use crate::info;
use crate::meta::MetaIndex;
use crate::monitor;
use crate::registry::Registry;
use crate::scheduler::{Node, Scheduler};

/// Progress callback for image pulls: `(engine_name, status)` with an
/// empty status at start and `"downloaded"` or an error message at
/// completion.
pub type PullProgress = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// The cluster orchestration core.
pub struct Cluster {
    pub(crate) registry: Registry,
    pub(crate) meta: MetaIndex,
    pub(crate) config: ClusterConfig,
    pub(crate) factory: Arc<dyn DriverFactory>,
    scheduler: Arc<dyn Scheduler>,
    intents: IntentStore,
    /// Cluster-wide scheduling mutex: serializes select + meta update,
    /// and the whole of remove. Never held across `engine.create`.
    placement_lock: AsyncMutex<()>,
    handler: OnceLock<Arc<dyn EventHandler>>,
    /// Engine ids with a failover task in flight.
    failovers: Mutex<HashSet<EngineId>>,
    me: Weak<Cluster>,
}

/// Handle to the cluster's background tasks.
///
/// The tasks run for the life of the process; the handle exists so
/// embedders and tests can wind them down deterministically.
#[derive(Debug)]
pub struct ClusterHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClusterHandle {
    /// Signal the background tasks and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl Cluster {
    /// Build a cluster from its injected collaborators.
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        intents: IntentStore,
        factory: Arc<dyn DriverFactory>,
        config: ClusterConfig,
    ) -> Arc<Cluster> {
        debug!(discovery = %config.discovery, "initializing cluster");
        Arc::new_cyclic(|me| Cluster {
            registry: Registry::new(),
            meta: MetaIndex::new(),
            config,
            factory,
            scheduler,
            intents,
            placement_lock: AsyncMutex::new(()),
            handler: OnceLock::new(),
            failovers: Mutex::new(HashSet::new()),
            me: me.clone(),
        })
    }

    /// Start the discovery ingress and the health monitor.
    ///
    /// Performs the provider's initial fetch first; an error there is
    /// fatal and propagated to the caller.
    pub async fn start(&self, provider: Arc<dyn DiscoveryProvider>) -> ClusterResult<ClusterHandle> {
        let entries = provider.fetch().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(discovery::run_ingress(
                self.me.clone(),
                provider,
                entries,
                shutdown_rx.clone(),
            )),
            tokio::spawn(monitor::run(self.me.clone(), shutdown_rx)),
        ];

        Ok(ClusterHandle {
            shutdown: shutdown_tx,
            tasks,
        })
    }

    // ── Placement operations ────────────────────────────────────────

    /// Schedule a brand new container onto the cluster.
    ///
    /// Returns `Ok(None)` when the selected node disappeared from the
    /// registry between selection and resolution (a race with
    /// membership changes, not an error).
    pub async fn create_container(
        &self,
        spec: ContainerSpec,
        name: &str,
    ) -> ClusterResult<Option<Arc<Container>>> {
        let guard = self.placement_lock.lock().await;

        let nodes = self.healthy_nodes().await;
        let node = self.scheduler.select_node(&nodes, &spec)?;

        let Some(engine) = self.registry.get(&node.id).await else {
            return Ok(None);
        };

        engine.add_to_queue(spec.clone(), name);
        self.meta.record(name, &spec, &engine);
        drop(guard);

        // The meta entry is not rolled back if the create fails; the
        // next health cycle re-drives convergence.
        let container = engine.create(spec.clone(), name, true).await?;

        self.intents.add(&IntentRecord {
            container_id: container.id.clone(),
            name: name.to_string(),
            spec,
        })?;
        Ok(Some(container))
    }

    /// Remove a container from the cluster.
    ///
    /// Held under the scheduling mutex so removal is atomic with
    /// respect to placement.
    pub async fn remove_container(
        &self,
        container: &Arc<Container>,
        force: bool,
    ) -> ClusterResult<()> {
        let _guard = self.placement_lock.lock().await;

        let Some(engine) = container.engine() else {
            warn!(container = %container.canonical_name(), "owning engine is gone, dropping records");
            self.meta.remove(container.canonical_name());
            return self.remove_intent(&container.id);
        };

        engine.destroy(container, force).await?;
        self.meta.remove(container.canonical_name());
        self.remove_intent(&container.id)
    }

    /// Start a container by canonical name on its current engine.
    ///
    /// A name without a placement is a no-op success.
    pub async fn start_container(&self, name: &str) -> ClusterResult<()> {
        let Some(meta) = self.meta.get(name) else {
            return Ok(());
        };
        meta.current.start(name).await?;
        Ok(())
    }

    /// Pull an image on every engine in parallel; returns after all
    /// engines finish.
    pub async fn pull(&self, image: &str, progress: Option<PullProgress>) {
        let engines = self.registry.snapshot_all().await;

        let mut tasks = Vec::with_capacity(engines.len());
        for engine in engines {
            let image = image.to_string();
            let progress = progress.clone();
            tasks.push(tokio::spawn(async move {
                if let Some(cb) = &progress {
                    cb(engine.name(), "");
                }
                let status = match engine.pull(&image).await {
                    Ok(()) => "downloaded".to_string(),
                    Err(e) => e.to_string(),
                };
                if let Some(cb) = &progress {
                    cb(engine.name(), &status);
                }
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Remove an image from the engine holding it.
    pub async fn remove_image(&self, image: &Image) -> ClusterResult<()> {
        let _guard = self.placement_lock.lock().await;
        let Some(engine) = image.engine() else {
            return Ok(());
        };
        engine.remove_image(&image.id).await?;
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// All containers across every engine.
    pub async fn containers(&self) -> Vec<Arc<Container>> {
        let engines = self.registry.snapshot_all().await;
        engines.iter().flat_map(|e| e.containers()).collect()
    }

    /// First container matching the id or name across engines; the
    /// engine iteration order is unspecified. An empty term returns
    /// `None` without taking any lock.
    pub async fn container(&self, id_or_name: &str) -> Option<Arc<Container>> {
        if id_or_name.is_empty() {
            return None;
        }
        let engines = self.registry.snapshot_all().await;
        engines.iter().find_map(|e| e.container(id_or_name))
    }

    /// All images across every engine.
    pub async fn images(&self) -> Vec<Arc<Image>> {
        let engines = self.registry.snapshot_all().await;
        engines.iter().flat_map(|e| e.images()).collect()
    }

    /// First image matching the id or tag across engines. An empty
    /// term returns `None` without taking any lock.
    pub async fn image(&self, id_or_name: &str) -> Option<Arc<Image>> {
        if id_or_name.is_empty() {
            return None;
        }
        let engines = self.registry.snapshot_all().await;
        engines.iter().find_map(|e| e.image(id_or_name))
    }

    /// Scheduler-facing snapshot of the healthy engines.
    pub async fn healthy_nodes(&self) -> Vec<Node> {
        let engines = self.registry.snapshot_healthy().await;
        engines.iter().map(|e| Node::from_engine(e)).collect()
    }

    /// Number of registered engines, healthy or not.
    pub async fn engine_count(&self) -> usize {
        self.registry.len().await
    }

    /// Ordered summary rows for tabular display.
    pub async fn info(&self) -> Vec<(String, String)> {
        let engines = self.registry.snapshot_all().await;
        info::render(
            self.scheduler.strategy(),
            &self.scheduler.filters(),
            engines,
        )
    }

    /// An arbitrary healthy engine, chosen by the scheduling policy
    /// with an empty spec.
    pub async fn random_engine(&self) -> ClusterResult<Option<Arc<Engine>>> {
        let nodes = self.healthy_nodes().await;
        let node = self.scheduler.select_node(&nodes, &ContainerSpec::default())?;
        Ok(self.registry.get(&node.id).await)
    }

    /// Current and previous engine ids for a placement, if any.
    pub fn placement_of(&self, name: &str) -> Option<(EngineId, EngineId)> {
        self.meta
            .get(name)
            .map(|m| (m.current.id().to_string(), m.previous.id().to_string()))
    }

    /// The durable intent store.
    pub fn intents(&self) -> &IntentStore {
        &self.intents
    }

    // ── Event surface ───────────────────────────────────────────────

    /// Register the external event handler.
    ///
    /// One-shot: a second call fails with
    /// [`ClusterError::HandlerAlreadyRegistered`].
    pub fn register_event_handler(&self, handler: Arc<dyn EventHandler>) -> ClusterResult<()> {
        self.handler
            .set(handler)
            .map_err(|_| ClusterError::HandlerAlreadyRegistered)
    }

    /// Dispatch an engine event to the registered handler. Handler
    /// errors are logged and swallowed.
    pub async fn dispatch(&self, event: &EngineEvent) {
        let Some(handler) = self.handler.get() else {
            return;
        };
        if let Err(e) = handler.handle(event).await {
            error!(engine = %event.engine_name, error = %e, "event handler failed");
        }
    }

    // ── Internal ────────────────────────────────────────────────────

    /// Remove an intent record, tolerating its absence.
    fn remove_intent(&self, container_id: &str) -> ClusterResult<()> {
        match self.intents.remove(container_id) {
            Ok(()) => Ok(()),
            Err(muster_state::StateError::NotFound(id)) => {
                debug!(container_id = %id, "container not found in the intent store");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Claim the failover slot for an engine. Returns false when a
    /// failover task is already in flight.
    pub(crate) fn begin_failover(&self, engine_id: &str) -> bool {
        self.failovers.lock().unwrap().insert(engine_id.to_string())
    }

    /// Release the failover slot for an engine.
    pub(crate) fn end_failover(&self, engine_id: &str) {
        self.failovers.lock().unwrap().remove(engine_id);
    }
}

/// Engines forward their lifecycle events to the cluster, which fans
/// them out to the registered handler.
#[async_trait]
impl EventHandler for Cluster {
    async fn handle(&self, event: &EngineEvent) -> anyhow::Result<()> {
        self.dispatch(event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerError;
    use crate::testutil::{connected_engine, FirstScheduler, StubDriver, StubFactory};

    async fn cluster_with_engines(engines: &[(&str, &str, &str)]) -> Arc<Cluster> {
        let cluster = Cluster::new(
            Arc::new(FirstScheduler),
            IntentStore::open_in_memory().unwrap(),
            StubFactory::new(),
            ClusterConfig::new("static://"),
        );
        for (id, name, addr) in engines {
            let engine = connected_engine(StubDriver::new(id, name), addr).await;
            cluster.registry.insert_if_absent(engine).await;
        }
        cluster
    }

    fn spec(image: &str) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            cpu_shares: 0.25,
            memory_bytes: 32 * 1024 * 1024,
            ..ContainerSpec::default()
        }
    }

    struct NopHandler;

    #[async_trait]
    impl EventHandler for NopHandler {
        async fn handle(&self, _event: &EngineEvent) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_places_and_records() {
        let cluster =
            cluster_with_engines(&[("eng-1", "node-1", "10.0.0.1:2375")]).await;

        let container = cluster
            .create_container(spec("img"), "app")
            .await
            .unwrap()
            .unwrap();

        let found = cluster.container("app").await.unwrap();
        assert_eq!(found.id, container.id);
        assert!(cluster.intents().contains(&container.id).unwrap());

        let (current, previous) = cluster.placement_of("app").unwrap();
        assert_eq!(current, "eng-1");
        assert_eq!(previous, "eng-1");
    }

    #[tokio::test]
    async fn create_without_engines_is_no_node_available() {
        let cluster = cluster_with_engines(&[]).await;

        let err = cluster.create_container(spec("img"), "app").await.unwrap_err();
        assert!(matches!(
            err,
            ClusterError::Scheduler(SchedulerError::NoNodeAvailable)
        ));
    }

    #[tokio::test]
    async fn remove_container_clears_all_records() {
        let cluster =
            cluster_with_engines(&[("eng-1", "node-1", "10.0.0.1:2375")]).await;

        let container = cluster
            .create_container(spec("img"), "app")
            .await
            .unwrap()
            .unwrap();
        cluster.remove_container(&container, true).await.unwrap();

        assert!(cluster.container(&container.id).await.is_none());
        assert!(!cluster.intents().contains(&container.id).unwrap());
        assert!(cluster.placement_of("app").is_none());
    }

    #[tokio::test]
    async fn start_without_placement_is_noop() {
        let cluster =
            cluster_with_engines(&[("eng-1", "node-1", "10.0.0.1:2375")]).await;
        cluster.start_container("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn start_runs_on_current_engine() {
        let cluster =
            cluster_with_engines(&[("eng-1", "node-1", "10.0.0.1:2375")]).await;

        cluster.create_container(spec("img"), "app").await.unwrap();
        cluster.start_container("app").await.unwrap();

        assert!(cluster.container("app").await.unwrap().is_running());
    }

    #[tokio::test]
    async fn empty_lookups_return_none() {
        let cluster =
            cluster_with_engines(&[("eng-1", "node-1", "10.0.0.1:2375")]).await;

        assert!(cluster.container("").await.is_none());
        assert!(cluster.image("").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_event_handler_is_rejected() {
        let cluster = cluster_with_engines(&[]).await;

        cluster.register_event_handler(Arc::new(NopHandler)).unwrap();
        let err = cluster
            .register_event_handler(Arc::new(NopHandler))
            .unwrap_err();
        assert!(matches!(err, ClusterError::HandlerAlreadyRegistered));
    }

    #[tokio::test]
    async fn pull_reports_start_and_completion_per_engine() {
        let cluster = cluster_with_engines(&[
            ("eng-1", "node-1", "10.0.0.1:2375"),
            ("eng-2", "node-2", "10.0.0.2:2375"),
        ])
        .await;

        let calls: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let progress: PullProgress = Arc::new(move |engine: &str, status: &str| {
            sink.lock()
                .unwrap()
                .push((engine.to_string(), status.to_string()));
        });

        cluster.pull("img", Some(progress)).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls.iter().filter(|(_, s)| s.is_empty()).count(), 2);
        assert_eq!(calls.iter().filter(|(_, s)| s == "downloaded").count(), 2);
        assert_eq!(cluster.images().await.len(), 2);
    }

    #[tokio::test]
    async fn info_reports_node_count() {
        let cluster = cluster_with_engines(&[
            ("eng-1", "node-1", "10.0.0.1:2375"),
            ("eng-2", "node-2", "10.0.0.2:2375"),
        ])
        .await;

        let info = cluster.info().await;
        assert_eq!(info[0], ("Strategy".to_string(), "first".to_string()));
        assert_eq!(info[2], ("Nodes".to_string(), "2".to_string()));
    }

    #[tokio::test]
    async fn random_engine_is_a_member() {
        let cluster =
            cluster_with_engines(&[("eng-1", "node-1", "10.0.0.1:2375")]).await;

        let engine = cluster.random_engine().await.unwrap().unwrap();
        assert_eq!(engine.id(), "eng-1");
    }

    #[tokio::test]
    async fn recreate_on_another_engine_shifts_previous() {
        let alpha = StubDriver::new("eng-1", "alpha");
        let cluster = Cluster::new(
            Arc::new(FirstScheduler),
            IntentStore::open_in_memory().unwrap(),
            StubFactory::new(),
            ClusterConfig::new("static://"),
        );
        let e1 = connected_engine(alpha.clone(), "10.0.0.1:2375").await;
        let e2 =
            connected_engine(StubDriver::new("eng-2", "beta"), "10.0.0.2:2375").await;
        cluster.registry.insert_if_absent(e1.clone()).await;
        cluster.registry.insert_if_absent(e2).await;

        cluster.create_container(spec("img"), "app").await.unwrap();
        let (current, previous) = cluster.placement_of("app").unwrap();
        assert_eq!((current.as_str(), previous.as_str()), ("eng-1", "eng-1"));

        // Take alpha down; its refresh loop flips the healthy flag.
        alpha.set_reachable(false);
        for _ in 0..200 {
            if !e1.is_healthy() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!e1.is_healthy());

        // The healthy snapshot now only contains beta.
        cluster.create_container(spec("img"), "app").await.unwrap();
        let (current, previous) = cluster.placement_of("app").unwrap();
        assert_eq!((current.as_str(), previous.as_str()), ("eng-2", "eng-1"));
    }
}
