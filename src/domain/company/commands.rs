use serde::Deserialize;

use super::value_objects::Country;

// ============================================================================
// Company Domain Commands
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCompany {
    pub name: String,
    pub address: String,
    pub country: Country,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterEmployee {
    pub company_id: String,
    pub name: String,
    pub email: String,
}
