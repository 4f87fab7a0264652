//! Health monitor, failover, and post-recovery adjustment.
//!
//! A single periodic task classifies every registered engine as
//! healthy or unhealthy and spawns a `failover` task on each
//! healthy→unhealthy transition and an `adjust` task on each
//! unhealthy→healthy transition. Both transition kinds cross the
//! monitor's serial loop, so for one engine the failover of a
//! transition is observed before any later adjust.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use muster_engine::Engine;

use crate::cluster::Cluster;

/// The monitor loop. Runs until shutdown or until the cluster is gone.
pub(crate) async fn run(cluster: Weak<Cluster>, mut shutdown: watch::Receiver<bool>) {
    let Some(interval) = cluster.upgrade().map(|c| c.config.monitor_interval) else {
        return;
    };
    debug!(?interval, "health monitor started");

    let mut healthy: HashMap<String, Arc<Engine>> = HashMap::new();
    let mut unhealthy: HashMap<String, Arc<Engine>> = HashMap::new();

    loop {
        // Pick up engines that joined since the last cycle.
        {
            let Some(cluster) = cluster.upgrade() else { break };
            for engine in cluster.registry.snapshot_all().await {
                let id = engine.id().to_string();
                if healthy.contains_key(&id) || unhealthy.contains_key(&id) {
                    continue;
                }
                if engine.is_healthy() {
                    healthy.insert(id, engine);
                } else {
                    unhealthy.insert(id, engine);
                }
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("health monitor shutting down");
                    break;
                }
            }
        }

        let Some(cluster) = cluster.upgrade() else { break };

        let went_down: Vec<Arc<Engine>> = healthy
            .values()
            .filter(|e| !e.is_healthy())
            .cloned()
            .collect();
        for engine in went_down {
            let id = engine.id().to_string();
            healthy.remove(&id);
            unhealthy.insert(id.clone(), engine.clone());
            info!(node = %id, "engine unhealthy, failing over");
            // One failover in flight per engine; a flapping engine
            // must not stack reschedule tasks.
            if cluster.begin_failover(&id) {
                tokio::spawn(failover(cluster.clone(), engine));
            }
        }

        if !unhealthy.is_empty() {
            debug!(unhealthy = unhealthy.len(), "unhealthy engines");
        }

        let recovered: Vec<Arc<Engine>> = unhealthy
            .values()
            .filter(|e| e.is_healthy())
            .cloned()
            .collect();
        for engine in recovered {
            let id = engine.id().to_string();
            unhealthy.remove(&id);
            healthy.insert(id.clone(), engine.clone());
            info!(node = %id, "engine recovered, adjusting placements");
            tokio::spawn(adjust(cluster.clone(), engine));
        }
    }
}

/// Migrate workloads off an engine that went unhealthy.
///
/// Waits through a two-step grace window, re-checking health between
/// steps; if the engine stays down, every running container with a
/// meta-placement entry is re-created (the scheduler picks a new
/// engine) and started there. Reschedule failures are logged, not
/// retried — the next health cycle may re-trigger.
async fn failover(cluster: Arc<Cluster>, engine: Arc<Engine>) {
    let grace = cluster.config.failover_grace;
    for step in 1..=2u32 {
        sleep(grace * step).await;
        if engine.is_healthy() {
            break;
        }
    }

    if !engine.is_healthy() {
        for container in engine.containers() {
            if !container.is_running() {
                continue;
            }
            let name = container.canonical_name().to_string();
            let Some(meta) = cluster.meta.get(&name) else {
                continue;
            };
            info!(node = %engine.id(), container = %name, "rescheduling container");
            match cluster.create_container(meta.spec.clone(), &name).await {
                Ok(_) => {
                    if let Err(e) = cluster.start_container(&name).await {
                        warn!(container = %name, error = %e, "failed to start rescheduled container");
                    }
                }
                Err(e) => {
                    warn!(container = %name, error = %e, "failed to reschedule container");
                }
            }
        }
    }

    cluster.end_failover(engine.id());
}

/// Clean up stale replicas on a recovered engine.
///
/// For every container on the engine whose placement moved during the
/// outage, the copy on the old holder is destroyed.
async fn adjust(cluster: Arc<Cluster>, engine: Arc<Engine>) {
    for container in engine.containers() {
        let name = container.canonical_name().to_string();
        let Some(meta) = cluster.meta.get(&name) else {
            continue;
        };
        if !meta.rescheduled() {
            continue;
        }
        if let Some(stale) = meta.previous.container(&name) {
            info!(node = %engine.id(), container = %name, "destroying stale replica after reschedule");
            if let Err(e) = meta.previous.destroy(&stale, true).await {
                warn!(container = %name, error = %e, "failed to destroy stale replica");
            }
        }
    }
}
