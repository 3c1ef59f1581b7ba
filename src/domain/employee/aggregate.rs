use serde::{Deserialize, Serialize};

use crate::persistence::core::{DomainAggregate, EntityId, EntityMetadata, EventEnvelope, RootEntity};
use super::errors::EmployeeError;
use super::events::*;
use super::value_objects::{EmployeeId, EmployeeStatus};

// ============================================================================
// Employee Aggregate - Business Logic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub company_id: String,
    pub status: EmployeeStatus,
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    #[serde(skip)]
    events: Vec<EventEnvelope<EmployeeEvent>>,
}

/// Validate email format (basic validation)
fn validate_email(email: &str) -> Result<(), EmployeeError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(EmployeeError::InvalidEmail(email.to_string())),
    }
}

impl Employee {
    /// New active employee of `company_id`
    pub fn create(name: &str, email: &str, company_id: &str) -> Result<Self, EmployeeError> {
        if name.trim().is_empty() {
            return Err(EmployeeError::EmptyName);
        }
        validate_email(email)?;

        let id = EmployeeId {
            name: name.to_string(),
            email: email.to_string(),
        };
        let employee_id = id.key()?;

        let mut employee = Self {
            id,
            company_id: company_id.to_string(),
            status: EmployeeStatus::Active,
            metadata: EntityMetadata::new(),
            events: Vec::new(),
        };
        employee.add_event(EmployeeEvent::Created(EmployeeCreated {
            employee_id,
            name: name.to_string(),
            company_id: company_id.to_string(),
        }));
        Ok(employee)
    }

    pub fn activate(&mut self) -> Result<(), EmployeeError> {
        self.transition(EmployeeStatus::Active, EmployeeEvent::Activated)
    }

    pub fn inactivate(&mut self) -> Result<(), EmployeeError> {
        self.transition(EmployeeStatus::Inactive, EmployeeEvent::Inactivated)
    }

    pub fn block(&mut self) -> Result<(), EmployeeError> {
        self.transition(EmployeeStatus::Blocked, EmployeeEvent::Blocked)
    }

    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }

    pub fn is_blocked(&self) -> bool {
        self.status == EmployeeStatus::Blocked
    }

    fn transition(
        &mut self,
        status: EmployeeStatus,
        event: fn(EmployeeStatusChanged) -> EmployeeEvent,
    ) -> Result<(), EmployeeError> {
        if self.status == status {
            return Err(EmployeeError::AlreadyInStatus(status));
        }
        self.status = status;
        self.touch();
        self.add_event(event(EmployeeStatusChanged {
            employee_id: self.id.email.clone(),
            last_update: self.metadata.last_update,
        }));
        Ok(())
    }
}

impl RootEntity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &EmployeeId {
        &self.id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.metadata
    }

    fn updatable_fields() -> &'static [&'static str] {
        &["company_id", "status"]
    }
}

impl DomainAggregate for Employee {
    type Event = EmployeeEvent;

    fn events(&self) -> &[EventEnvelope<EmployeeEvent>] {
        &self.events
    }

    fn events_mut(&mut self) -> &mut Vec<EventEnvelope<EmployeeEvent>> {
        &mut self.events
    }
}
