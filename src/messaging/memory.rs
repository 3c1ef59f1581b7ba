use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::bus::{BusError, EventBusClient, PutEventsRequestEntry, PutEventsResponse, PutEventsResultEntry};

// ============================================================================
// In-Memory Event Bus
// ============================================================================
//
// Records every put_events call and keeps the entries it accepted. Tests
// can script the next responses: a client error, or a response where some
// entries are reported as failed.
//
// ============================================================================

enum Scripted {
    Error(BusError),
    RejectEntries {
        indices: Vec<usize>,
        code: String,
        message: String,
    },
}

#[derive(Default)]
pub struct InMemoryEventBus {
    calls: Mutex<Vec<Vec<PutEventsRequestEntry>>>,
    published: Mutex<Vec<PutEventsRequestEntry>>,
    scripted: Mutex<VecDeque<Scripted>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next_call(&self, error: BusError) {
        self.scripted.lock().await.push_back(Scripted::Error(error));
    }

    /// Report the entries at `indices` as failed on the next call
    pub async fn reject_entries_next_call(
        &self,
        indices: impl IntoIterator<Item = usize>,
        code: &str,
        message: &str,
    ) {
        self.scripted.lock().await.push_back(Scripted::RejectEntries {
            indices: indices.into_iter().collect(),
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    /// Every call received, failed ones included
    pub async fn calls(&self) -> Vec<Vec<PutEventsRequestEntry>> {
        self.calls.lock().await.clone()
    }

    /// Entries the bus accepted, in acceptance order
    pub async fn published_entries(&self) -> Vec<PutEventsRequestEntry> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventBusClient for InMemoryEventBus {
    async fn put_events(&self, entries: &[PutEventsRequestEntry]) -> Result<PutEventsResponse, BusError> {
        self.calls.lock().await.push(entries.to_vec());

        let (rejected, code, message) = match self.scripted.lock().await.pop_front() {
            Some(Scripted::Error(error)) => return Err(error),
            Some(Scripted::RejectEntries { indices, code, message }) => (indices, code, message),
            None => (Vec::new(), String::new(), String::new()),
        };

        let mut published = self.published.lock().await;
        let mut response = PutEventsResponse::default();

        for (index, entry) in entries.iter().enumerate() {
            if rejected.contains(&index) {
                response.failed_entry_count += 1;
                response.entries.push(PutEventsResultEntry::failed(code.clone(), message.clone()));
            } else {
                published.push(entry.clone());
                response.entries.push(PutEventsResultEntry::accepted(Uuid::new_v4().to_string()));
            }
        }

        Ok(response)
    }
}
