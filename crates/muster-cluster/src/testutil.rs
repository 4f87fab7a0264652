//! In-process fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use muster_engine::{
    ContainerSummary, DriverError, DriverFactory, DriverInfo, Engine, EngineDriver, ImageSummary,
    TlsConfig,
};
use muster_state::{ContainerId, ContainerSpec};

use crate::scheduler::{Node, Scheduler, SchedulerError};

type DriverResult<T> = Result<T, DriverError>;

/// Scriptable in-memory engine driver.
pub(crate) struct StubDriver {
    info: DriverInfo,
    reachable: AtomicBool,
    containers: Mutex<Vec<ContainerSummary>>,
    images: Mutex<Vec<ImageSummary>>,
    next_id: AtomicU64,
}

impl StubDriver {
    pub(crate) fn new(id: &str, name: &str) -> Arc<Self> {
        Arc::new(Self {
            info: DriverInfo {
                id: id.to_string(),
                name: name.to_string(),
                labels: HashMap::new(),
                cpus: 4,
                memory_bytes: 8 * 1024 * 1024 * 1024,
            },
            reachable: AtomicBool::new(true),
            containers: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl EngineDriver for StubDriver {
    async fn info(&self) -> DriverResult<DriverInfo> {
        Ok(self.info.clone())
    }

    async fn ping(&self) -> DriverResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::Unavailable("connection refused".to_string()))
        }
    }

    async fn list_containers(&self) -> DriverResult<Vec<ContainerSummary>> {
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn list_images(&self) -> DriverResult<Vec<ImageSummary>> {
        Ok(self.images.lock().unwrap().clone())
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        name: &str,
    ) -> DriverResult<ContainerId> {
        let mut containers = self.containers.lock().unwrap();
        let slashed = format!("/{name}");
        if containers.iter().any(|c| c.names.contains(&slashed)) {
            return Err(DriverError::NameConflict(name.to_string()));
        }
        let id = format!(
            "{}-ctr-{}",
            self.info.id,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        containers.push(ContainerSummary {
            id: id.clone(),
            names: vec![slashed],
            running: false,
            spec: spec.clone(),
        });
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> DriverResult<()> {
        let mut containers = self.containers.lock().unwrap();
        let slashed = format!("/{name}");
        match containers.iter_mut().find(|c| c.names.contains(&slashed)) {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => Err(DriverError::NotFound(name.to_string())),
        }
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> DriverResult<()> {
        self.containers.lock().unwrap().retain(|c| &c.id != id);
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> DriverResult<()> {
        self.images.lock().unwrap().push(ImageSummary {
            id: format!("sha256:{image}"),
            repo_tags: vec![image.to_string()],
        });
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> DriverResult<()> {
        self.images
            .lock()
            .unwrap()
            .retain(|i| !i.repo_tags.iter().any(|t| t == image) && !i.id.starts_with(image));
        Ok(())
    }
}

/// Factory that serves pre-registered stub drivers by address.
#[derive(Default)]
pub(crate) struct StubFactory {
    drivers: Mutex<HashMap<String, Arc<StubDriver>>>,
}

impl StubFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, addr: &str, driver: Arc<StubDriver>) {
        self.drivers.lock().unwrap().insert(addr.to_string(), driver);
    }
}

#[async_trait]
impl DriverFactory for StubFactory {
    async fn connect(
        &self,
        addr: &str,
        _tls: Option<&TlsConfig>,
    ) -> DriverResult<Arc<dyn EngineDriver>> {
        let drivers = self.drivers.lock().unwrap();
        match drivers.get(addr) {
            Some(driver) if driver.reachable.load(Ordering::SeqCst) => {
                Ok(driver.clone() as Arc<dyn EngineDriver>)
            }
            _ => Err(DriverError::Unavailable(format!("no route to {addr}"))),
        }
    }
}

/// Deterministic policy: first node in (name, id) order.
pub(crate) struct FirstScheduler;

impl Scheduler for FirstScheduler {
    fn select_node(&self, nodes: &[Node], _spec: &ContainerSpec) -> Result<Node, SchedulerError> {
        let mut sorted: Vec<&Node> = nodes.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        sorted
            .first()
            .map(|n| (*n).clone())
            .ok_or(SchedulerError::NoNodeAvailable)
    }

    fn strategy(&self) -> &str {
        "first"
    }

    fn filters(&self) -> String {
        "health".to_string()
    }
}

/// Build a connected engine around a stub driver.
pub(crate) async fn connected_engine(driver: Arc<StubDriver>, addr: &str) -> Arc<Engine> {
    let factory = StubFactory::new();
    factory.register(addr, driver);
    let engine = Engine::new(addr, 0.05)
        .with_refresh_interval(Duration::from_millis(10))
        .with_failure_threshold(1)
        .shared();
    engine
        .connect(factory.as_ref(), None)
        .await
        .expect("stub engine connects");
    engine
}
