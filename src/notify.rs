use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation lifecycle signals, one channel per resource.
///
/// This is the engine's entire notification responsibility: committed events
/// (including the post-creation confirmation signal) are published here
/// fire-and-forget. Delivery — mail, push, whatever — belongs to whoever
/// subscribes.
pub struct NotifyHub {
    channels: DashMap<ResourceId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to signals for a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: &str) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(resource_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a signal. No-op if nobody is listening.
    pub fn send(&self, resource_id: &str, event: &Event) {
        if let Some(sender) = self.channels.get(resource_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a resource is retired upstream).
    #[allow(dead_code)]
    pub fn remove(&self, resource_id: &str) {
        self.channels.remove(resource_id);
    }
}
