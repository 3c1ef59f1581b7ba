use serde::{Deserialize, Serialize};

use crate::persistence::core::{EntityId, KeyAttribute};

// ============================================================================
// Company Value Objects
// ============================================================================

/// Company identity: the registered company name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId {
    pub value: String,
}

impl CompanyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

impl EntityId for CompanyId {
    fn key_attributes(&self) -> Vec<KeyAttribute> {
        vec![KeyAttribute::new("value", self.value.clone())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompanyStatus {
    Enabled,
    Disabled,
}

/// Countries a company can be registered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    Usa,
    Arg,
    Dom,
    Co,
}
