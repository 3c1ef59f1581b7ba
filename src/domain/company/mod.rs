// ============================================================================
// Company Domain - Business Logic for the Company Aggregate
// ============================================================================
//
// - Value objects (CompanyId, CompanyStatus, Country)
// - Events (CompanyCreated, CompanyEnabled, CompanyDisabled)
// - Commands (CreateCompany, RegisterEmployee)
// - Errors (CompanyError enum)
// - Aggregate (Company)
// - Command Handler (CompanyCommandHandler)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
