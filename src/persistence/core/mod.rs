// ============================================================================
// Persistence Core - Identity, Entities and Events
// ============================================================================
//
// Generic building blocks shared by every aggregate type:
// - Canonical keys derived from identifying attributes
// - Versioned root entities with timestamps
// - Domain event envelopes buffered by aggregates
//
// ============================================================================

pub mod entity;
pub mod event;
pub mod key;

pub use entity::{DomainAggregate, EntityMetadata, EpochTime, RootEntity};
pub use event::{DomainEvent, EventEnvelope, RawEvent};
pub use key::{canonical_key, EntityId, KeyAttribute, KeyError, KeyValue, KEY_SEPARATOR};
