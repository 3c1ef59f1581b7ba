mod memory;
mod session;
mod write_operation;

pub use memory::InMemorySession;
pub use session::{Session, SessionError, WriteSession};
pub use write_operation::{
    build_write_operation, WriteKind, WriteOperation, WriteOperationError, WriteOptions,
};
