use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::session::{check_single_limit, PendingOperations, SessionError, WriteSession};
use super::write_operation::WriteOperation;

// ============================================================================
// In-Memory Session
// ============================================================================
//
// Same staging rules as the store-backed session (one write per identity,
// single-transaction limit, insertion-ordered chunks) but commits only
// record the operations each transaction would have written.
//
// ============================================================================

pub struct InMemorySession {
    pending: Mutex<PendingOperations>,
    committed: Mutex<Vec<Vec<WriteOperation>>>,
    max_batch_size: usize,
}

impl InMemorySession {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            pending: Mutex::new(PendingOperations::default()),
            committed: Mutex::new(Vec::new()),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Every committed transaction, in commit order
    pub fn committed(&self) -> Vec<Vec<WriteOperation>> {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identities of every committed operation, flattened in commit order
    pub fn committed_identities(&self) -> Vec<String> {
        self.committed()
            .iter()
            .flatten()
            .map(WriteOperation::identity)
            .collect()
    }

    pub fn pending_identities(&self) -> Vec<String> {
        PendingOperations::lock(&self.pending).identities()
    }

    fn record(&self, transaction: Vec<WriteOperation>) {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transaction);
    }
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl WriteSession for InMemorySession {
    fn add_write_operation(&self, operation: WriteOperation) -> Result<(), SessionError> {
        PendingOperations::lock(&self.pending).stage(operation)
    }

    fn pending_count(&self) -> usize {
        PendingOperations::lock(&self.pending).len()
    }

    fn clear(&self) {
        PendingOperations::lock(&self.pending).clear();
    }

    async fn execute_in_single_transaction(&self) -> Result<(), SessionError> {
        let operations = PendingOperations::lock(&self.pending).drain();
        if operations.is_empty() {
            return Ok(());
        }
        check_single_limit(operations.len(), self.max_batch_size)?;
        self.record(operations);
        Ok(())
    }

    async fn execute_in_batch_transaction(&self) -> Result<(), SessionError> {
        let operations = PendingOperations::lock(&self.pending).drain();
        for chunk in operations.chunks(self.max_batch_size) {
            self.record(chunk.to_vec());
        }
        Ok(())
    }
}
