mod bus;
mod handlers;
mod types;

pub use bus::{EventBus, EventReceiver};
pub use handlers::EventLogger;
pub use types::{AgentEvent, AgentEventPayload, EventSequence};
