//! Domain services

pub mod fuel_norm;
pub mod validation;

pub use fuel_norm::{compute_norm, COLD_WEATHER_PENALTY};
pub use validation::{
    blocking, validate_for_commit, validate_record, RecordError, ValidationIssue, TRIP_COUNT_SOFT_LIMIT,
};
