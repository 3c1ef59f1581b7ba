// ============================================================================
// Messaging - Domain Event Publication
// ============================================================================

mod bus;
mod memory;
mod publisher;

pub use bus::{BusError, EventBusClient, PutEventsRequestEntry, PutEventsResponse, PutEventsResultEntry};
pub use memory::InMemoryEventBus;
pub use publisher::{EventBusPublisher, EventPublishError, EventPublisher, FailedEntry};
