//! Per-engine request queue.
//!
//! The queue is the sole writer-ordering point per engine: create
//! intents are enqueued before the actual driver call, and the create
//! path holds the queue's order lock so duplicate concurrent creates
//! for the same name serialize instead of racing.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use muster_state::ContainerSpec;

/// A create intent waiting to be executed.
#[derive(Debug, Clone)]
pub struct QueuedCreate {
    pub name: String,
    pub spec: ContainerSpec,
}

/// FIFO of pending create intents plus the order lock.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: Mutex<VecDeque<QueuedCreate>>,
    order: AsyncMutex<()>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a create intent.
    pub fn enqueue(&self, name: &str, spec: ContainerSpec) {
        let mut pending = self.pending.lock().unwrap();
        pending.push_back(QueuedCreate {
            name: name.to_string(),
            spec,
        });
    }

    /// Remove and return the oldest intent for `name`, if any.
    pub fn take(&self, name: &str) -> Option<QueuedCreate> {
        let mut pending = self.pending.lock().unwrap();
        let pos = pending.iter().position(|q| q.name == name)?;
        pending.remove(pos)
    }

    /// Acquire the order lock; held across the driver create call.
    pub async fn order(&self) -> MutexGuard<'_, ()> {
        self.order.lock().await
    }

    /// Number of queued intents.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_and_take_fifo_per_name() {
        let queue = RequestQueue::new();
        queue.enqueue("web", ContainerSpec::default());
        queue.enqueue("db", ContainerSpec::default());
        queue.enqueue("web", ContainerSpec::default());

        assert_eq!(queue.len(), 3);
        assert!(queue.take("web").is_some());
        assert!(queue.take("db").is_some());
        assert!(queue.take("web").is_some());
        assert!(queue.take("web").is_none());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn order_lock_serializes() {
        let queue = RequestQueue::new();
        let first = queue.order().await;
        assert!(queue.order.try_lock().is_err());
        drop(first);
        assert!(queue.order.try_lock().is_ok());
    }
}
