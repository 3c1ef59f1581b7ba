use serde::{Deserialize, Serialize};

use crate::persistence::core::{EntityId, KeyAttribute};

// ============================================================================
// Employee Value Objects
// ============================================================================

/// Employee identity: name and email together
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId {
    pub name: String,
    pub email: String,
}

impl EntityId for EmployeeId {
    fn key_attributes(&self) -> Vec<KeyAttribute> {
        vec![
            KeyAttribute::new("name", self.name.clone()),
            KeyAttribute::new("email", self.email.clone()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmployeeStatus {
    Active,
    Inactive,
    Blocked,
}
