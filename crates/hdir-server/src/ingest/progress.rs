//! Live progress fan-out
//!
//! The registry maps a batch id to a broadcast channel. Subscribers register
//! when they connect and unregister when they leave; the engine publishes
//! without knowing whether anyone is listening. Slow subscribers lose the
//! oldest snapshots rather than holding ingestion back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::models::ProgressSnapshot;

/// Snapshots buffered per batch before slow receivers start lagging
const DEFAULT_BUFFER_SIZE: usize = 64;

/// Sink for progress snapshots
pub trait ProgressPublisher: Send + Sync {
    fn publish(&self, snapshot: &ProgressSnapshot);
}

/// Publisher that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl ProgressPublisher for NoopPublisher {
    fn publish(&self, _snapshot: &ProgressSnapshot) {}
}

struct Channel {
    sender: broadcast::Sender<ProgressSnapshot>,
    subscribers: usize,
}

/// Per-batch subscriber registry
///
/// Holds only transient channel handles, never batch state.
#[derive(Clone)]
pub struct ProgressRegistry {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
    capacity: usize,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, Channel>> {
        // Poisoning is ignored: the map only holds channel handles
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to a batch's snapshots
    pub fn register(&self, batch_id: &str) -> broadcast::Receiver<ProgressSnapshot> {
        let mut channels = self.channels();
        let channel = channels.entry(batch_id.to_string()).or_insert_with(|| Channel {
            sender: broadcast::channel(self.capacity).0,
            subscribers: 0,
        });
        channel.subscribers += 1;
        tracing::debug!(batch_id, subscribers = channel.subscribers, "Progress subscriber registered");
        channel.sender.subscribe()
    }

    /// Drop one subscription; the channel goes away with its last subscriber
    pub fn unregister(&self, batch_id: &str) {
        let mut channels = self.channels();
        if let Some(channel) = channels.get_mut(batch_id) {
            channel.subscribers = channel.subscribers.saturating_sub(1);
            if channel.subscribers == 0 {
                channels.remove(batch_id);
            }
        }
        tracing::debug!(batch_id, "Progress subscriber unregistered");
    }

    /// Send to every subscriber of the batch. Returns how many received it.
    pub fn broadcast(&self, snapshot: &ProgressSnapshot) -> usize {
        let channels = self.channels();
        channels
            .get(&snapshot.batch_id)
            .map(|channel| channel.sender.send(snapshot.clone()).unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, batch_id: &str) -> usize {
        self.channels()
            .get(batch_id)
            .map_or(0, |channel| channel.subscribers)
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressPublisher for ProgressRegistry {
    fn publish(&self, snapshot: &ProgressSnapshot) {
        self.broadcast(snapshot);
    }
}

impl std::fmt::Debug for ProgressRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressRegistry")
            .field("batches", &self.channels().len())
            .finish()
    }
}
