use serde::{Deserialize, Serialize};

use crate::persistence::core::{DomainEvent, EpochTime};
use super::value_objects::Country;

// ============================================================================
// Company Domain Events
// ============================================================================

/// Union type for all company events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CompanyEvent {
    Created(CompanyCreated),
    Enabled(CompanyEnabled),
    Disabled(CompanyDisabled),
}

impl DomainEvent for CompanyEvent {
    const DOMAIN_NAME: &'static str = "company";

    fn event_type(&self) -> &'static str {
        match self {
            CompanyEvent::Created(_) => "CompanyCreated",
            CompanyEvent::Enabled(_) => "CompanyEnabled",
            CompanyEvent::Disabled(_) => "CompanyDisabled",
        }
    }
}

// Individual event types

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyCreated {
    pub company_id: String,
    pub name: String,
    pub address: String,
    pub country: Country,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyEnabled {
    pub company_id: String,
    pub last_update: EpochTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyDisabled {
    pub company_id: String,
    pub last_update: EpochTime,
}
