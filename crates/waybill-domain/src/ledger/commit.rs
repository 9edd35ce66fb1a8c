//! Sequential commit workflow
//!
//! Each plain day moves `NotSaved → Savable → Saved`. Day N+1 only becomes
//! savable once day N is saved, and no day is ever `Saved` after an unsaved
//! one. Night shifts are committed with the day they follow and mirror its
//! state.
//!
//! Saves are split in two so the gateway call can run without holding the
//! ledger: `begin_*` checks and snapshots, `complete_*` applies the outcome.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use thiserror::Error;
use waybill_types::{GatewayError, RecordKey, SaveState};

use super::{LedgerError, MonthLedger};
use crate::repository::{DayPayload, MonthSaveResponse, MonthSnapshot};
use crate::service::validation::{
    blocking, validate_for_commit, validate_record, RecordError, ValidationIssue,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommitError {
    #[error("Day {day} cannot be saved before day {waiting_on} is saved")]
    OutOfSequence { day: u32, waiting_on: u32 },

    #[error("Day {0} is already saved")]
    AlreadySaved(u32),

    #[error("A save for day {0} is already in progress")]
    InFlight(u32),

    #[error("A month save is already in progress")]
    MonthInFlight,

    #[error("Day {day} failed validation: {}", join_issues(.issues))]
    Validation {
        day: u32,
        issues: Vec<ValidationIssue>,
    },

    #[error("{} record(s) failed validation", .0.len())]
    BatchValidation(Vec<RecordError>),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl CommitError {
    /// Out-of-order commit, detected locally or reported by the backend
    pub fn is_sequence(&self) -> bool {
        match self {
            CommitError::OutOfSequence { .. } => true,
            CommitError::Gateway(e) => e.is_sequence(),
            _ => false,
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A per-day save that has been checked and is waiting on the gateway
#[derive(Debug, Clone)]
pub struct DaySaveTicket {
    day: u32,
    date: NaiveDate,
    payload: DayPayload,
    day_revision: u64,
    night_revision: Option<u64>,
}

impl DaySaveTicket {
    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn payload(&self) -> &DayPayload {
        &self.payload
    }
}

/// A whole-month save that passed local validation
#[derive(Debug, Clone)]
pub struct MonthSaveTicket {
    snapshot: MonthSnapshot,
    revisions: HashMap<RecordKey, u64>,
}

impl MonthSaveTicket {
    pub fn snapshot(&self) -> &MonthSnapshot {
        &self.snapshot
    }
}

impl MonthLedger {
    pub fn save_state(&self, day: u32) -> Option<SaveState> {
        self.day(day).map(|r| r.save_state)
    }

    pub fn is_day_in_flight(&self, day: u32) -> bool {
        self.days_in_flight.contains(&day)
    }

    pub fn is_month_in_flight(&self) -> bool {
        self.month_in_flight
    }

    /// Any record holds changes the backend has not seen
    pub fn has_unsaved_changes(&self) -> bool {
        self.nodes.values().any(|n| n.record.dirty)
    }

    /// Check that `day` may be persisted now and snapshot its payload
    pub fn begin_save_day(&mut self, day: u32) -> Result<DaySaveTicket, CommitError> {
        let day_key = RecordKey::day(day);
        let record = self
            .get(day_key)
            .ok_or(LedgerError::UnknownRecord(day_key))?;
        let date = self
            .month
            .date(day)
            .ok_or(LedgerError::UnknownRecord(day_key))?;

        if self.days_in_flight.contains(&day) {
            return Err(CommitError::InFlight(day));
        }
        match record.save_state {
            SaveState::Saved => return Err(CommitError::AlreadySaved(day)),
            SaveState::NotSaved => {
                let waiting_on = self.first_unsaved_before(day).unwrap_or(day);
                log::warn!("Rejected out-of-order save of day {}", day);
                return Err(CommitError::OutOfSequence { day, waiting_on });
            }
            SaveState::Savable => {}
        }

        let night = self.night_shift_after(day).cloned();
        let mut issues = blocking(&validate_for_commit(record));
        if let Some(ref night) = night {
            issues.extend(blocking(&validate_record(night)));
        }
        if !issues.is_empty() {
            let all = validate_for_commit(record);
            if let Some(r) = self.record_mut(day_key) {
                r.validation_errors = all;
            }
            return Err(CommitError::Validation { day, issues });
        }

        let ticket = DaySaveTicket {
            day,
            date,
            payload: DayPayload {
                record: record.clone(),
                night_shift: night.clone(),
                seeds: (day == 1).then_some(self.seeds),
                weather_enabled: self.weather_enabled,
            },
            day_revision: record.revision,
            night_revision: night.as_ref().map(|n| n.revision),
        };
        self.days_in_flight.insert(day);
        Ok(ticket)
    }

    /// Apply the gateway's answer to a per-day save.
    ///
    /// On success returns the day's resulting state: `Saved`, or `Savable`
    /// when the day (or its predecessor) changed while the save was in flight.
    pub fn complete_save_day(
        &mut self,
        ticket: DaySaveTicket,
        result: Result<(), GatewayError>,
    ) -> Result<SaveState, CommitError> {
        let day = ticket.day;
        self.days_in_flight.remove(&day);

        if let Err(e) = result {
            log::warn!("Save of day {} failed: {}", day, e);
            return Err(CommitError::Gateway(e));
        }

        let day_key = RecordKey::day(day);
        let current_night = self.night_shift_after(day).map(|n| n.revision);
        let unchanged = self.get(day_key).map(|r| r.revision) == Some(ticket.day_revision)
            && current_night == ticket.night_revision;
        let predecessor_saved = day == 1 || self.save_state(day - 1) == Some(SaveState::Saved);

        if unchanged && predecessor_saved {
            for key in [day_key, RecordKey::night(day)] {
                if let Some(r) = self.record_mut(key) {
                    r.save_state = SaveState::Saved;
                    r.dirty = false;
                }
            }
            self.normalize_save_states();
            log::info!("Day {} of {} saved", day, self.month);
            Ok(SaveState::Saved)
        } else {
            log::info!("Day {} changed during save; keeping it open", day);
            self.normalize_save_states();
            Ok(self.save_state(day).unwrap_or_default())
        }
    }

    /// Validate every record and snapshot the month for a batch save
    pub fn begin_save_month(&mut self) -> Result<MonthSaveTicket, CommitError> {
        if self.month_in_flight {
            return Err(CommitError::MonthInFlight);
        }

        let mut errors = Vec::new();
        for node in self.nodes.values_mut() {
            let issues = validate_record(&node.record);
            let blocking_issues = blocking(&issues);
            node.record.validation_errors = issues;
            if !blocking_issues.is_empty() {
                errors.push(RecordError {
                    key: node.record.key(),
                    issues: blocking_issues,
                });
            }
        }
        if !errors.is_empty() {
            errors.sort_by_key(|e| e.key);
            return Err(CommitError::BatchValidation(errors));
        }

        let records: Vec<_> = self.records().into_iter().cloned().collect();
        let revisions = records.iter().map(|r| (r.key(), r.revision)).collect();
        self.month_in_flight = true;
        Ok(MonthSaveTicket {
            snapshot: MonthSnapshot {
                seeds: self.seeds,
                weather_enabled: self.weather_enabled,
                records,
            },
            revisions,
        })
    }

    /// Apply the gateway's answer to a batch save
    pub fn complete_save_month(
        &mut self,
        ticket: MonthSaveTicket,
        result: Result<MonthSaveResponse, GatewayError>,
    ) -> Result<(), CommitError> {
        self.month_in_flight = false;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Month save of {} failed: {}", self.month, e);
                return Err(CommitError::Gateway(e));
            }
        };

        if !response.success {
            for error in &response.errors {
                if let Some(r) = self.record_mut(error.key) {
                    r.validation_errors = error.issues.clone();
                }
            }
            log::warn!(
                "Month save of {} rejected with {} error(s)",
                self.month,
                response.errors.len()
            );
            return Err(CommitError::BatchValidation(response.errors));
        }

        for (key, revision) in &ticket.revisions {
            if let Some(r) = self.record_mut(*key) {
                if r.revision == *revision {
                    r.save_state = SaveState::Saved;
                    r.dirty = false;
                }
            }
        }
        self.normalize_save_states();
        log::info!("Month {} of {} saved", self.month, self.vehicle.vehicle_id);
        Ok(())
    }

    /// Rebuild save states from the days the backend reports as saved
    pub fn reconcile(&mut self, saved_days: &BTreeSet<u32>) {
        for node in self.nodes.values_mut() {
            let record = &mut node.record;
            record.save_state = if saved_days.contains(&record.day) && !record.dirty {
                SaveState::Saved
            } else {
                SaveState::NotSaved
            };
        }
        self.normalize_save_states();
    }

    /// Records changed by an edit must be committed again
    pub(crate) fn mark_changed(&mut self, changed: &[RecordKey]) {
        if changed.is_empty() {
            return;
        }
        for key in changed {
            if let Some(r) = self.record_mut(*key) {
                r.dirty = true;
                if r.save_state == SaveState::Saved {
                    r.save_state = SaveState::NotSaved;
                }
            }
            // A changed night shift reopens the day that owns it
            if key.night {
                if let Some(owner) = self.record_mut(RecordKey::day(key.day)) {
                    owner.dirty = true;
                    if owner.save_state == SaveState::Saved {
                        owner.save_state = SaveState::NotSaved;
                    }
                }
            }
        }
        self.normalize_save_states();
    }

    /// Enforce the ordering rule over the whole month.
    ///
    /// The contiguous run of saved days from day 1 stays `Saved`; the first
    /// day after it becomes `Savable`; everything later is `NotSaved`.
    pub(crate) fn normalize_save_states(&mut self) {
        let mut prefix_open = true;
        for day in 1..=self.month.days_in_month() {
            let Some(record) = self.record_mut(RecordKey::day(day)) else {
                prefix_open = false;
                continue;
            };
            let saved = record.save_state == SaveState::Saved && !record.dirty;
            record.save_state = if prefix_open && saved {
                SaveState::Saved
            } else if prefix_open {
                prefix_open = false;
                SaveState::Savable
            } else {
                SaveState::NotSaved
            };

            let state = record.save_state;
            if let Some(night) = self.record_mut(RecordKey::night(day)) {
                night.save_state = state;
            }
        }
    }

    fn first_unsaved_before(&self, day: u32) -> Option<u32> {
        (1..day).find(|d| self.save_state(*d) != Some(SaveState::Saved))
    }
}
