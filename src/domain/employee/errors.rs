use super::value_objects::EmployeeStatus;

// ============================================================================
// Employee Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EmployeeError {
    #[error("Employee name cannot be empty")]
    EmptyName,

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Employee is already {0:?}")]
    AlreadyInStatus(EmployeeStatus),

    #[error(transparent)]
    Key(#[from] crate::persistence::core::KeyError),
}
