use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::event::{OutboundEvent, Topic};

// Fire-and-forget publisher. Delivery is at-most-once: the durable ride
// record is the source of truth, subscribers poll if they miss an event.
#[derive(Clone)]
pub struct EventNotifier {
    tx: broadcast::Sender<OutboundEvent>,
}

impl EventNotifier {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size);
        Self { tx }
    }

    pub fn publish(&self, topic: Topic, key: impl Into<String>, payload: Value) {
        let event = OutboundEvent {
            topic,
            key: key.into(),
            payload,
            published_at: Utc::now(),
        };

        debug!(topic = topic.as_str(), key = %event.key, "publishing event");

        if self.tx.send(event).is_err() {
            debug!(topic = topic.as_str(), "no subscribers for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }
}
