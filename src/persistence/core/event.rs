use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::EpochTime;

// ============================================================================
// Event Envelope - Domain Event Metadata
// ============================================================================
//
// Wraps a domain event payload with its synthetic id, creation time, the
// domain tag used as the bus "source" and the concrete event kind used as
// the bus "detail-type". Envelopes are immutable once built.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub created: EpochTime,
    pub domain_name: String,
    pub event_type: String,
    pub event_data: E,
}

/// Type-erased envelope handed to the unit of work and the publisher
pub type RawEvent = EventEnvelope<serde_json::Value>;

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(event_data: E) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            created: EpochTime::now(),
            domain_name: E::DOMAIN_NAME.to_string(),
            event_type: event_data.event_type().to_string(),
            event_data,
        }
    }

    /// Serialize the payload, keeping the envelope metadata
    pub fn into_raw(self) -> Result<RawEvent, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            created: self.created,
            domain_name: self.domain_name,
            event_type: self.event_type,
            event_data: serde_json::to_value(&self.event_data)?,
        })
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// All domain events implement this trait to be buffered and published
pub trait DomainEvent: Serialize + Clone + Send + Sync {
    /// Domain tag, published as the event source
    const DOMAIN_NAME: &'static str;

    /// Concrete event kind, published as the detail type
    fn event_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    #[serde(tag = "type", content = "data")]
    enum TestEvent {
        Opened { by: String },
        Closed,
    }

    impl DomainEvent for TestEvent {
        const DOMAIN_NAME: &'static str = "Test";

        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Opened { .. } => "TestOpened",
                TestEvent::Closed => "TestClosed",
            }
        }
    }

    #[test]
    fn test_event_envelope_creation() {
        let envelope = EventEnvelope::new(TestEvent::Opened { by: "ana".into() });

        assert_eq!(envelope.domain_name, "Test");
        assert_eq!(envelope.event_type, "TestOpened");
        assert_eq!(envelope.event_data, TestEvent::Opened { by: "ana".into() });
    }

    #[test]
    fn test_event_ids_are_unique() {
        let first = EventEnvelope::new(TestEvent::Closed);
        let second = EventEnvelope::new(TestEvent::Closed);

        assert_ne!(first.event_id, second.event_id);
        assert!(first.created < second.created);
    }

    #[test]
    fn test_into_raw_keeps_metadata() {
        let envelope = EventEnvelope::new(TestEvent::Opened { by: "ana".into() });
        let event_id = envelope.event_id;

        let raw = envelope.into_raw().unwrap();
        assert_eq!(raw.event_id, event_id);
        assert_eq!(raw.event_type, "TestOpened");
        assert_eq!(raw.event_data["type"], "Opened");
        assert_eq!(raw.event_data["data"]["by"], "ana");
    }
}
