//! Per-record validation
//!
//! Issues are attached to the record they concern; one failing record never
//! stops the others from being edited or checked.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use waybill_types::RecordKey;

use crate::model::DayRecord;

/// Trip counts above this only raise a warning
pub const TRIP_COUNT_SOFT_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("odometer end {end} is below start {start}")]
    OdometerBackwards { start: u64, end: u64 },

    #[error("fuel norm {norm:.2} exceeds available fuel {available:.2}")]
    FuelOverConsumption { available: f64, norm: f64 },

    #[error("{trips} trips is unusually high")]
    TripCountHigh { trips: u32 },

    #[error("driver is not assigned")]
    MissingDriver,

    #[error("trip number is missing")]
    MissingTripNumber,

    #[error("start values are unknown (previous day not loaded)")]
    StartUnknown,
}

impl ValidationIssue {
    /// Blocking issues prevent the record from being persisted
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            ValidationIssue::FuelOverConsumption { .. } | ValidationIssue::TripCountHigh { .. }
        )
    }
}

/// Validation failures of one record, as returned by batch saves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub key: RecordKey,
    pub issues: Vec<ValidationIssue>,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "day {}: {}", self.key, messages.join("; "))
    }
}

/// Checks applied to every record, on edit and on the batch path
pub fn validate_record(record: &DayRecord) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if record.provisional {
        issues.push(ValidationIssue::StartUnknown);
    }

    if let (Some(start), Some(end)) = (record.odometer_start, record.odometer_end) {
        if end < start {
            issues.push(ValidationIssue::OdometerBackwards { start, end });
        }
    }

    if let Some(available) = record.fuel_available() {
        if record.fuel_norm > available {
            issues.push(ValidationIssue::FuelOverConsumption {
                available,
                norm: record.fuel_norm,
            });
        }
    }

    if record.trip_count > TRIP_COUNT_SOFT_LIMIT {
        issues.push(ValidationIssue::TripCountHigh {
            trips: record.trip_count,
        });
    }

    if record.has_activity() {
        if is_blank(&record.driver_id) {
            issues.push(ValidationIssue::MissingDriver);
        }
        if is_blank(&record.trip_number) {
            issues.push(ValidationIssue::MissingTripNumber);
        }
    }

    issues
}

/// Checks for the incremental per-day save: a driver is always required
pub fn validate_for_commit(record: &DayRecord) -> Vec<ValidationIssue> {
    let mut issues = validate_record(record);
    if is_blank(&record.driver_id) && !issues.contains(&ValidationIssue::MissingDriver) {
        issues.push(ValidationIssue::MissingDriver);
    }
    issues
}

pub fn blocking(issues: &[ValidationIssue]) -> Vec<ValidationIssue> {
    issues.iter().filter(|i| i.is_blocking()).cloned().collect()
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
