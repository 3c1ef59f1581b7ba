use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::metrics::Metrics;
use crate::persistence::store::{KeyValueStore, StoreError, TransactWriteItem};
use crate::utils::{retry_on_transient, RetryConfig};

use super::write_operation::WriteOperation;

// ============================================================================
// Session - Pending Write Operations of One Scope
// ============================================================================
//
// The session is the only place that decides what a commit writes:
// - At most one write per entity identity (table + canonical key)
// - Single mode: every operation in one all-or-nothing store transaction
// - Batch mode: insertion-ordered chunks, each its own transaction
//
// Execution drains the pending operations before talking to the store, so
// the session is empty afterwards whatever the outcome.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Duplicate write operation for {identity}")]
    DuplicateWriteOperation { identity: String },

    #[error("Batch size exceeded: {count} operations, limit is {limit}")]
    BatchSizeExceeded { count: usize, limit: usize },

    #[error("Transaction failed: {reason}")]
    TransactionFailed {
        reason: String,
        #[source]
        source: StoreError,
    },

    #[error("Batch chunk {chunk} of {chunks} failed: {reason}")]
    ChunkFailed {
        chunk: usize,
        chunks: usize,
        reason: String,
        #[source]
        source: StoreError,
    },
}

impl SessionError {
    /// Store error behind a failed transaction, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            SessionError::TransactionFailed { source, .. } | SessionError::ChunkFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Collects the write operations of one scope and commits them
#[async_trait]
pub trait WriteSession: Send + Sync {
    /// Stage one operation; a second write to the same entity is rejected
    fn add_write_operation(&self, operation: WriteOperation) -> Result<(), SessionError>;

    fn pending_count(&self) -> usize;

    /// Discard every pending operation
    fn clear(&self);

    /// Commit every pending operation as one atomic transaction
    async fn execute_in_single_transaction(&self) -> Result<(), SessionError>;

    /// Commit pending operations in insertion-ordered chunks
    async fn execute_in_batch_transaction(&self) -> Result<(), SessionError>;
}

#[derive(Default)]
pub(super) struct PendingOperations {
    operations: Vec<WriteOperation>,
    identities: HashSet<String>,
}

impl PendingOperations {
    pub(super) fn lock(pending: &Mutex<PendingOperations>) -> MutexGuard<'_, PendingOperations> {
        pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn stage(&mut self, operation: WriteOperation) -> Result<(), SessionError> {
        let identity = operation.identity();
        if !self.identities.insert(identity.clone()) {
            tracing::warn!(identity = %identity, "Rejected duplicate write operation");
            return Err(SessionError::DuplicateWriteOperation { identity });
        }

        tracing::debug!(
            identity = %identity,
            kind = operation.kind().as_str(),
            pending = self.operations.len() + 1,
            "Staged write operation"
        );
        self.operations.push(operation);
        Ok(())
    }

    pub(super) fn len(&self) -> usize {
        self.operations.len()
    }

    pub(super) fn identities(&self) -> Vec<String> {
        self.operations.iter().map(WriteOperation::identity).collect()
    }

    pub(super) fn clear(&mut self) {
        if !self.operations.is_empty() {
            tracing::debug!(discarded = self.operations.len(), "Clearing pending write operations");
        }
        self.operations.clear();
        self.identities.clear();
    }

    pub(super) fn drain(&mut self) -> Vec<WriteOperation> {
        self.identities.clear();
        std::mem::take(&mut self.operations)
    }
}

/// Reject a single transaction larger than the store accepts
pub(super) fn check_single_limit(count: usize, limit: usize) -> Result<(), SessionError> {
    if count > limit {
        tracing::error!(
            count = count,
            limit = limit,
            "Too many write operations for a single transaction"
        );
        return Err(SessionError::BatchSizeExceeded { count, limit });
    }
    Ok(())
}

/// Session committing to a key-value store
pub struct Session<S: KeyValueStore> {
    store: Arc<S>,
    pending: Mutex<PendingOperations>,
    max_batch_size: usize,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<S: KeyValueStore> Session<S> {
    pub fn new(store: Arc<S>, max_batch_size: usize, retry: RetryConfig) -> Self {
        Self {
            store,
            pending: Mutex::new(PendingOperations::default()),
            max_batch_size: max_batch_size.max(1),
            retry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Identities of the staged operations, in staging order
    pub fn pending_identities(&self) -> Vec<String> {
        PendingOperations::lock(&self.pending).identities()
    }

    async fn transact(&self, items: &[TransactWriteItem]) -> Result<(), StoreError> {
        let store = &self.store;
        let metrics = &self.metrics;

        let result = retry_on_transient(&self.retry, |attempt| {
            if attempt > 1 {
                if let Some(metrics) = metrics {
                    metrics.record_retry_attempt("store_transaction");
                }
            }
            async move { store.transact_write_items(items).await }
        })
        .await
        .into_result();

        if let Some(metrics) = metrics {
            metrics.record_store_transaction(items.len(), result.is_ok());
        }
        result
    }

    fn drain(&self) -> Vec<WriteOperation> {
        PendingOperations::lock(&self.pending).drain()
    }
}

#[async_trait]
impl<S: KeyValueStore> WriteSession for Session<S> {
    fn add_write_operation(&self, operation: WriteOperation) -> Result<(), SessionError> {
        let kind = operation.kind();
        PendingOperations::lock(&self.pending).stage(operation)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_staged(kind.as_str());
        }
        Ok(())
    }

    fn pending_count(&self) -> usize {
        PendingOperations::lock(&self.pending).len()
    }

    fn clear(&self) {
        PendingOperations::lock(&self.pending).clear();
    }

    async fn execute_in_single_transaction(&self) -> Result<(), SessionError> {
        let operations = self.drain();
        if operations.is_empty() {
            tracing::debug!("No pending write operations, nothing to commit");
            return Ok(());
        }
        check_single_limit(operations.len(), self.max_batch_size)?;

        let items = instructions(&operations);
        self.transact(&items).await.map_err(|source| SessionError::TransactionFailed {
            reason: source.reasons_message(),
            source,
        })
    }

    /// Chunks are independent transactions: a failing chunk stops the commit
    /// but chunks written before it stay written.
    async fn execute_in_batch_transaction(&self) -> Result<(), SessionError> {
        let operations = self.drain();
        if operations.is_empty() {
            tracing::debug!("No pending write operations, nothing to commit");
            return Ok(());
        }

        let items = instructions(&operations);
        let chunks = items.len().div_ceil(self.max_batch_size);

        for (index, chunk) in items.chunks(self.max_batch_size).enumerate() {
            tracing::debug!(chunk = index + 1, chunks = chunks, size = chunk.len(), "Committing batch chunk");

            if let Err(source) = self.transact(chunk).await {
                tracing::error!(
                    chunk = index + 1,
                    chunks = chunks,
                    committed_chunks = index,
                    error = %source,
                    "Batch chunk failed, earlier chunks remain committed"
                );
                return Err(SessionError::ChunkFailed {
                    chunk: index + 1,
                    chunks,
                    reason: source.reasons_message(),
                    source,
                });
            }
        }

        tracing::info!(operations = items.len(), chunks = chunks, "Batch committed");
        Ok(())
    }
}

fn instructions(operations: &[WriteOperation]) -> Vec<TransactWriteItem> {
    operations
        .iter()
        .map(|operation| operation.instruction().clone())
        .collect()
}
