use serde::{Deserialize, Serialize};

use crate::persistence::core::{DomainAggregate, EntityMetadata, EventEnvelope, RootEntity};
use super::errors::CompanyError;
use super::events::*;
use super::value_objects::{CompanyId, CompanyStatus, Country};

// ============================================================================
// Company Aggregate - Business Logic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub address: String,
    pub status: CompanyStatus,
    pub country: Country,
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    #[serde(skip)]
    events: Vec<EventEnvelope<CompanyEvent>>,
}

impl Company {
    /// New enabled company, identified by its name
    pub fn create(name: &str, address: &str, country: Country) -> Result<Self, CompanyError> {
        if name.trim().is_empty() {
            return Err(CompanyError::EmptyName);
        }
        if address.trim().is_empty() {
            return Err(CompanyError::EmptyAddress);
        }

        let mut company = Self {
            id: CompanyId::new(name),
            name: name.to_string(),
            address: address.to_string(),
            status: CompanyStatus::Enabled,
            country,
            metadata: EntityMetadata::new(),
            events: Vec::new(),
        };
        company.add_event(CompanyEvent::Created(CompanyCreated {
            company_id: company.id.value.clone(),
            name: company.name.clone(),
            address: company.address.clone(),
            country,
        }));
        Ok(company)
    }

    pub fn enable(&mut self) -> Result<(), CompanyError> {
        if self.is_enabled() {
            return Err(CompanyError::AlreadyEnabled);
        }
        self.status = CompanyStatus::Enabled;
        self.touch();
        self.add_event(CompanyEvent::Enabled(CompanyEnabled {
            company_id: self.id.value.clone(),
            last_update: self.metadata.last_update,
        }));
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), CompanyError> {
        if self.is_disabled() {
            return Err(CompanyError::AlreadyDisabled);
        }
        self.status = CompanyStatus::Disabled;
        self.touch();
        self.add_event(CompanyEvent::Disabled(CompanyDisabled {
            company_id: self.id.value.clone(),
            last_update: self.metadata.last_update,
        }));
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.status == CompanyStatus::Enabled
    }

    pub fn is_disabled(&self) -> bool {
        self.status == CompanyStatus::Disabled
    }
}

impl RootEntity for Company {
    type Id = CompanyId;

    fn id(&self) -> &CompanyId {
        &self.id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.metadata
    }

    fn updatable_fields() -> &'static [&'static str] {
        &["name", "address", "status", "country"]
    }
}

impl DomainAggregate for Company {
    type Event = CompanyEvent;

    fn events(&self) -> &[EventEnvelope<CompanyEvent>] {
        &self.events
    }

    fn events_mut(&mut self) -> &mut Vec<EventEnvelope<CompanyEvent>> {
        &mut self.events
    }
}
