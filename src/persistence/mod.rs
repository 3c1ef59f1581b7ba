// ============================================================================
// Persistence - Versioned Aggregates behind a Unit of Work
// ============================================================================
//
// core        identity, root entities, event envelopes
// store       key-value store seam and its in-memory implementation
// session     conditional write operations collected per scope
// repository  aggregate access that stages writes into a session
// unit_of_work transaction/batch scopes, commit and event flush
//
// ============================================================================

pub mod core;
pub mod repository;
pub mod session;
pub mod store;
pub mod unit_of_work;

pub use repository::{Repository, RepositoryError, StoreRepository};
pub use session::{
    InMemorySession, Session, SessionError, WriteKind, WriteOperation, WriteOperationError,
    WriteSession,
};
pub use unit_of_work::{TransactionType, UnitOfWork, UnitOfWorkError, UnitOfWorkScope};
