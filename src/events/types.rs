use crate::types::ProcessedItem;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sequence number for ordering events
pub type EventSequence = u64;

/// All agent events delivered to shell subscribers
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub payload: AgentEventPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEventPayload {
    /// A pipeline item reached a terminal status
    ItemProcessed { item: ProcessedItem },

    /// Configuration is missing a credential the agent needs
    SetupRequested { reason: String },

    /// The server session started or stopped
    ServerStatus { running: bool },
}

impl AgentEvent {
    pub fn payload_type(&self) -> &str {
        match &self.payload {
            AgentEventPayload::ItemProcessed { .. } => "item-processed",
            AgentEventPayload::SetupRequested { .. } => "setup-requested",
            AgentEventPayload::ServerStatus { .. } => "server-status",
        }
    }
}
