use super::types::{AgentEvent, AgentEventPayload, EventSequence};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

pub type EventReceiver = broadcast::Receiver<AgentEvent>;
pub type EventSender = broadcast::Sender<AgentEvent>;

/// Event bus for distributing agent events to shell subscribers
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: EventSender,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event (returns sequence number).
    /// Fire-and-forget: a bus with no subscribers swallows the event.
    pub fn publish(&self, payload: AgentEventPayload) -> EventSequence {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let event = AgentEvent {
            sequence,
            timestamp: Utc::now(),
            payload,
        };

        let kind = event.payload_type().to_string();
        if self.sender.send(event).is_err() {
            debug!(event = %kind, sequence, "No subscribers for event");
        }

        sequence
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Get current sequence number
    pub fn current_sequence(&self) -> EventSequence {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Get number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
