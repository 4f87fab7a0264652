//! Discovery provider seam and the ingress task.
//!
//! The provider delivers the current membership view as batches of
//! `host:port` entries — once via `fetch` at startup, then at its own
//! cadence through the channel returned by `watch`. The ingress task
//! turns every previously unseen address into a connected, registered
//! engine.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use muster_engine::Engine;

use crate::cluster::Cluster;

/// Errors from the discovery provider.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Provider initialization failed. Fatal at startup.
    #[error("discovery initialization failed: {0}")]
    Init(String),

    #[error("discovery fetch failed: {0}")]
    Fetch(String),

    #[error("invalid discovery entry: {0}")]
    InvalidEntry(String),
}

/// One engine address produced by the discovery provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub host: String,
    pub port: u16,
}

impl Entry {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` string.
    pub fn parse(s: &str) -> Result<Self, DiscoveryError> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DiscoveryError::InvalidEntry(s.to_string()))?;
        if host.is_empty() {
            return Err(DiscoveryError::InvalidEntry(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| DiscoveryError::InvalidEntry(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Produces the cluster membership view.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// One-shot fetch of the current entries. An error here is fatal
    /// at cluster startup.
    async fn fetch(&self) -> Result<Vec<Entry>, DiscoveryError>;

    /// Subscribe to updated entry lists at the provider's cadence.
    fn watch(&self) -> mpsc::Receiver<Vec<Entry>>;
}

/// The discovery ingress loop: fan out the initial batch, then every
/// watched batch, until shutdown.
pub(crate) async fn run_ingress(
    cluster: Weak<Cluster>,
    provider: Arc<dyn DiscoveryProvider>,
    initial: Vec<Entry>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(entries = initial.len(), "discovery ingress started");
    dispatch_batch(&cluster, initial);

    let mut updates = provider.watch();
    loop {
        tokio::select! {
            batch = updates.recv() => {
                match batch {
                    Some(entries) => dispatch_batch(&cluster, entries),
                    None => {
                        debug!("discovery provider closed its watch channel");
                        break;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("discovery ingress shutting down");
                    break;
                }
            }
        }
    }
}

/// Process each entry of a batch concurrently.
fn dispatch_batch(cluster: &Weak<Cluster>, entries: Vec<Entry>) {
    for entry in entries {
        let cluster = cluster.clone();
        tokio::spawn(async move {
            let Some(cluster) = cluster.upgrade() else {
                return;
            };
            register_entry(cluster, entry).await;
        });
    }
}

/// Connect and register a single discovered entry.
///
/// Skips addresses that are already members. Connection failures drop
/// the entry from this batch; duplicate engine ids are logged by the
/// registry and the newcomer is discarded. A failed event-handler
/// registration is logged and the engine stays registered.
async fn register_entry(cluster: Arc<Cluster>, entry: Entry) {
    let addr = entry.to_string();
    if cluster.registry.contains_addr(&addr).await {
        return;
    }

    let engine = Engine::new(addr.clone(), cluster.config.overcommit_ratio)
        .with_refresh_interval(cluster.config.heartbeat)
        .with_failure_threshold(cluster.config.engine_failure_threshold)
        .shared();

    if let Err(e) = engine
        .connect(cluster.factory.as_ref(), cluster.config.tls.as_ref())
        .await
    {
        error!(%addr, error = %e, "failed to connect to discovered engine");
        return;
    }

    if cluster.registry.insert_if_absent(engine.clone()).await {
        if let Err(e) = engine.register_event_handler(cluster.clone()) {
            error!(engine = %engine.name(), error = %e, "failed to register event handler");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_renders_as_host_port() {
        let entry = Entry::new("10.0.0.1", 2375);
        assert_eq!(entry.to_string(), "10.0.0.1:2375");
    }

    #[test]
    fn entry_parses_host_port() {
        let entry = Entry::parse("10.0.0.1:2375").unwrap();
        assert_eq!(entry.host, "10.0.0.1");
        assert_eq!(entry.port, 2375);
    }

    #[test]
    fn entry_parse_rejects_garbage() {
        assert!(Entry::parse("no-port").is_err());
        assert!(Entry::parse(":2375").is_err());
        assert!(Entry::parse("host:notaport").is_err());
    }
}
