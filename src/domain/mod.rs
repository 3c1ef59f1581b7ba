// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Aggregates persisted through the unit of work. Each aggregate has its own
// subdirectory with value objects, events, errors and the aggregate itself;
// company also owns the command handler that drives both aggregates.
//
// ============================================================================

pub mod company;
pub mod employee;
