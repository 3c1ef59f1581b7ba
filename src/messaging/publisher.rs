use std::sync::Arc;

use async_trait::async_trait;

use crate::config::PublisherConfig;
use crate::metrics::Metrics;
use crate::persistence::core::RawEvent;
use crate::utils::retry_with_backoff;

use super::bus::{BusError, EventBusClient, PutEventsRequestEntry};

// ============================================================================
// Event Publisher - Domain Events to the Event Bus
// ============================================================================
//
// Each envelope becomes one bus entry:
// - source      = domain tag of the event
// - detail-type = concrete event kind
// - detail      = the serialized envelope
//
// A response with failed entries fails the whole call. Every failure is
// retried with the configured backoff before it reaches the caller.
//
// ============================================================================

/// Entry the bus refused, kept for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEntry {
    pub index: usize,
    pub detail_type: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EventPublishError {
    #[error("{} of {total} events were rejected by the event bus", .entries.len())]
    FailedEntries { total: usize, entries: Vec<FailedEntry> },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventPublishError {
    pub fn failed_entries(&self) -> &[FailedEntry] {
        match self {
            EventPublishError::FailedEntries { entries, .. } => entries,
            _ => &[],
        }
    }
}

/// Narrow publishing contract used by the unit of work
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, events: &[RawEvent]) -> Result<(), EventPublishError>;
}

pub struct EventBusPublisher<C: EventBusClient> {
    client: Arc<C>,
    config: PublisherConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<C: EventBusClient> EventBusPublisher<C> {
    pub fn new(client: Arc<C>, config: PublisherConfig) -> Self {
        Self {
            client,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Bus entry for one envelope
    pub fn to_entry(&self, event: &RawEvent) -> Result<PutEventsRequestEntry, EventPublishError> {
        Ok(PutEventsRequestEntry {
            event_bus_name: self.config.event_bus_name.clone(),
            source: event.domain_name.clone(),
            detail_type: event.event_type.clone(),
            detail: serde_json::to_string(event)?,
        })
    }

    async fn submit(&self, entries: &[PutEventsRequestEntry]) -> Result<(), EventPublishError> {
        let response = self.client.put_events(entries).await?;

        if response.failed_entry_count == 0 {
            tracing::info!(
                event_bus = %self.config.event_bus_name,
                events = entries.len(),
                "Events published successfully"
            );
            return Ok(());
        }

        let failed: Vec<FailedEntry> = response
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_failure())
            .map(|(index, entry)| FailedEntry {
                index,
                detail_type: entries
                    .get(index)
                    .map(|request| request.detail_type.clone())
                    .unwrap_or_default(),
                code: entry.error_code.clone().unwrap_or_default(),
                message: entry.error_message.clone().unwrap_or_default(),
            })
            .collect();

        for entry in &failed {
            tracing::error!(
                index = entry.index,
                detail_type = %entry.detail_type,
                error_code = %entry.code,
                error_message = %entry.message,
                "Failed to publish event"
            );
        }

        Err(EventPublishError::FailedEntries {
            total: entries.len(),
            entries: failed,
        })
    }
}

#[async_trait]
impl<C: EventBusClient> EventPublisher for EventBusPublisher<C> {
    async fn publish(&self, events: &[RawEvent]) -> Result<(), EventPublishError> {
        tracing::info!(events = events.len(), "Publishing domain events");
        if events.is_empty() {
            tracing::warn!("No events provided, nothing to publish");
            return Ok(());
        }

        let entries = events
            .iter()
            .map(|event| self.to_entry(event))
            .collect::<Result<Vec<_>, _>>()?;

        let metrics = &self.metrics;
        let result = retry_with_backoff(&self.config.retry, |attempt| {
            if attempt > 1 {
                if let Some(metrics) = metrics {
                    metrics.record_retry_attempt("publish_events");
                }
            }
            self.submit(&entries)
        })
        .await
        .into_result();

        if let Some(metrics) = metrics {
            metrics.record_publish(entries.len(), result.is_ok());
        }
        if let Err(error) = &result {
            tracing::error!(error = %error, "Error publishing domain events");
        }
        result
    }
}
