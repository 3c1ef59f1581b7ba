use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::IsTransient;

// ============================================================================
// Event Bus Client - Wire Shapes
// ============================================================================

/// One event submitted to the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutEventsRequestEntry {
    pub event_bus_name: String,
    /// Domain tag of the event
    pub source: String,
    /// Concrete event kind
    pub detail_type: String,
    /// Serialized event envelope
    pub detail: String,
}

/// Outcome for one submitted entry, in request order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutEventsResultEntry {
    pub event_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl PutEventsResultEntry {
    pub fn accepted(event_id: impl Into<String>) -> Self {
        Self {
            event_id: Some(event_id.into()),
            ..Self::default()
        }
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_id: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error_code.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutEventsResponse {
    pub failed_entry_count: usize,
    pub entries: Vec<PutEventsResultEntry>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("Event bus throttled the request: {0}")]
    Throttled(String),

    #[error("Event bus unavailable: {0}")]
    Unavailable(String),

    #[error("Event bus rejected the request: {0}")]
    Rejected(String),
}

impl IsTransient for BusError {
    fn is_transient(&self) -> bool {
        !matches!(self, BusError::Rejected(_))
    }
}

/// Submits batches of events to an event bus
#[async_trait]
pub trait EventBusClient: Send + Sync {
    async fn put_events(&self, entries: &[PutEventsRequestEntry]) -> Result<PutEventsResponse, BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_uses_bus_field_names() {
        let entry = PutEventsRequestEntry {
            event_bus_name: "bus".into(),
            source: "company".into(),
            detail_type: "CompanyCreated".into(),
            detail: "{}".into(),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["EventBusName"], "bus");
        assert_eq!(json["DetailType"], "CompanyCreated");
    }

    #[test]
    fn test_result_entries() {
        assert!(!PutEventsResultEntry::accepted("e-1").is_failure());
        assert!(PutEventsResultEntry::failed("InternalFailure", "boom").is_failure());
    }

    #[test]
    fn test_rejection_is_permanent() {
        assert!(BusError::Throttled("slow down".into()).is_transient());
        assert!(!BusError::Rejected("bad entry".into()).is_transient());
    }
}
