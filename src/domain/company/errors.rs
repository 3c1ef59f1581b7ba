// ============================================================================
// Company Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CompanyError {
    #[error("Company name cannot be empty")]
    EmptyName,

    #[error("Company address cannot be empty")]
    EmptyAddress,

    #[error("Company {0} already exists")]
    AlreadyExists(String),

    #[error("Company not found: {0}")]
    NotFound(String),

    #[error("Company is already enabled")]
    AlreadyEnabled,

    #[error("Company is already disabled")]
    AlreadyDisabled,

    #[error("Company {0} must be enabled to perform this operation")]
    NotEnabled(String),
}
