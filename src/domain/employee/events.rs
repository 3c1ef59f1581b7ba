use serde::{Deserialize, Serialize};

use crate::persistence::core::{DomainEvent, EpochTime};

// ============================================================================
// Employee Domain Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EmployeeEvent {
    Created(EmployeeCreated),
    Activated(EmployeeStatusChanged),
    Inactivated(EmployeeStatusChanged),
    Blocked(EmployeeStatusChanged),
}

impl DomainEvent for EmployeeEvent {
    const DOMAIN_NAME: &'static str = "employee";

    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::Created(_) => "EmployeeCreated",
            EmployeeEvent::Activated(_) => "EmployeeActivated",
            EmployeeEvent::Inactivated(_) => "EmployeeInactivated",
            EmployeeEvent::Blocked(_) => "EmployeeBlocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeCreated {
    pub employee_id: String,
    pub name: String,
    pub company_id: String,
}

/// Payload shared by every status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeStatusChanged {
    pub employee_id: String,
    pub last_update: EpochTime,
}
