use std::sync::atomic::{AtomicI64, Ordering};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use chrono::Utc;

use super::event::{DomainEvent, EventEnvelope};
use super::key::EntityId;

// ============================================================================
// Root Entity / Aggregate Model
// ============================================================================
//
// Key Principles:
// 1. Every root entity carries created/last_update timestamps and a version
// 2. version starts at 0 and moves by exactly 1 per durable write
// 3. Aggregates buffer the domain events produced by their mutations
// 4. The buffer is drained exactly once through pull_events()
//
// ============================================================================

static LAST_EPOCH_NS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock timestamp with nanosecond resolution.
///
/// Readings taken through `now()` never go backwards within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochTime(i64);

impl EpochTime {
    pub fn now() -> Self {
        let wall = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros().saturating_mul(1_000));

        let mut previous = LAST_EPOCH_NS.load(Ordering::Relaxed);
        loop {
            let next = wall.max(previous + 1);
            match LAST_EPOCH_NS.compare_exchange_weak(previous, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self(next),
                Err(current) => previous = current,
            }
        }
    }

    pub fn from_nanos(time_ns: i64) -> Self {
        Self(time_ns)
    }

    pub fn time_ns(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EpochTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bookkeeping shared by every root entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub created: EpochTime,
    pub last_update: EpochTime,
    pub version: i64,
}

impl EntityMetadata {
    pub fn new() -> Self {
        let now = EpochTime::now();
        Self {
            created: now,
            last_update: now,
            version: 0,
        }
    }
}

impl Default for EntityMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A versioned entity that is the unit of storage
pub trait RootEntity: Serialize + DeserializeOwned + Clone + Send + Sync {
    type Id: EntityId;

    fn id(&self) -> &Self::Id;

    fn metadata(&self) -> &EntityMetadata;

    fn metadata_mut(&mut self) -> &mut EntityMetadata;

    /// Attributes written by a partial update, besides `version` and
    /// `last_update` which are always written.
    fn updatable_fields() -> &'static [&'static str];

    fn version(&self) -> i64 {
        self.metadata().version
    }

    fn increase_version(&mut self) {
        self.metadata_mut().version += 1;
    }

    /// Refresh last_update after a state-mutating operation
    fn touch(&mut self) {
        self.metadata_mut().last_update = EpochTime::now();
    }
}

/// Root entity that records domain events for its mutations
pub trait DomainAggregate: RootEntity {
    type Event: DomainEvent;

    fn events(&self) -> &[EventEnvelope<Self::Event>];

    fn events_mut(&mut self) -> &mut Vec<EventEnvelope<Self::Event>>;

    fn add_event(&mut self, event: Self::Event) {
        self.events_mut().push(EventEnvelope::new(event));
    }

    /// Return the buffered events and leave the buffer empty
    fn pull_events(&mut self) -> Vec<EventEnvelope<Self::Event>> {
        std::mem::take(self.events_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::core::key::KeyAttribute;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct FooId {
        value: String,
    }

    impl EntityId for FooId {
        fn key_attributes(&self) -> Vec<KeyAttribute> {
            vec![KeyAttribute::new("value", self.value.clone())]
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct FooTouched {
        foo: String,
    }

    impl DomainEvent for FooTouched {
        const DOMAIN_NAME: &'static str = "Foo";

        fn event_type(&self) -> &'static str {
            "FooTouched"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Foo {
        id: FooId,
        #[serde(flatten)]
        metadata: EntityMetadata,
        #[serde(skip)]
        events: Vec<EventEnvelope<FooTouched>>,
    }

    impl RootEntity for Foo {
        type Id = FooId;

        fn id(&self) -> &FooId {
            &self.id
        }

        fn metadata(&self) -> &EntityMetadata {
            &self.metadata
        }

        fn metadata_mut(&mut self) -> &mut EntityMetadata {
            &mut self.metadata
        }

        fn updatable_fields() -> &'static [&'static str] {
            &[]
        }
    }

    impl DomainAggregate for Foo {
        type Event = FooTouched;

        fn events(&self) -> &[EventEnvelope<FooTouched>] {
            &self.events
        }

        fn events_mut(&mut self) -> &mut Vec<EventEnvelope<FooTouched>> {
            &mut self.events
        }
    }

    fn foo() -> Foo {
        Foo {
            id: FooId { value: "test".into() },
            metadata: EntityMetadata::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_epoch_time_is_strictly_increasing() {
        let readings: Vec<EpochTime> = (0..100).map(|_| EpochTime::now()).collect();
        assert!(readings.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_root_entity_defaults() {
        let foo = foo();
        assert_eq!(foo.version(), 0);
        assert_eq!(foo.metadata().created, foo.metadata().last_update);
    }

    #[test]
    fn test_increase_version_moves_by_one() {
        let mut foo = foo();
        foo.increase_version();
        foo.increase_version();
        assert_eq!(foo.version(), 2);
    }

    #[test]
    fn test_touch_refreshes_last_update_only() {
        let mut foo = foo();
        let created = foo.metadata().created;
        foo.touch();
        assert_eq!(foo.metadata().created, created);
        assert!(foo.metadata().last_update > created);
    }

    #[test]
    fn test_pull_events_drains_exactly_once() {
        let mut foo = foo();
        foo.add_event(FooTouched { foo: "a".into() });
        foo.add_event(FooTouched { foo: "b".into() });
        assert_eq!(foo.events().len(), 2);

        let pulled = foo.pull_events();
        assert_eq!(pulled.len(), 2);
        assert_eq!(pulled[0].event_data.foo, "a");
        assert!(foo.events().is_empty());
        assert!(foo.pull_events().is_empty());
    }

    #[test]
    fn test_events_are_not_serialized_with_the_entity() {
        let mut foo = foo();
        foo.add_event(FooTouched { foo: "a".into() });

        let json = serde_json::to_value(&foo).unwrap();
        assert!(json.get("events").is_none());
        assert_eq!(json["version"], 0);
        assert!(json["created"].is_i64());
    }
}
