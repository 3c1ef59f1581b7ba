//! Persistence of versioned aggregates through a unit of work.
//!
//! Repositories stage conditional writes into the session of a unit of
//! work; committing a transaction or batch scope writes them to a key-value
//! store and then publishes the buffered domain events to an event bus.

pub mod config;
pub mod domain;
pub mod messaging;
pub mod metrics;
pub mod persistence;
pub mod utils;

pub use config::{AppSettings, ConfigError, PublisherConfig, UnitOfWorkConfig};
pub use persistence::{
    InMemorySession, Repository, RepositoryError, SessionError, TransactionType, UnitOfWork,
    UnitOfWorkError, UnitOfWorkScope, WriteSession,
};
