//! Backend-side state of one vehicle month and the rules applied on save
//!
//! Both gateways keep a `StoredMonth` per (vehicle, month) and route every
//! save through it, so the sequence rule and the batch re-validation behave
//! the same whether the month lives on disk or in memory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use waybill_domain::ledger::MonthSeeds;
use waybill_domain::model::DayRecord;
use waybill_domain::repository::{DayPayload, LoadedMonth, MonthSaveResponse, MonthSnapshot};
use waybill_domain::service::{blocking, validate_for_commit, validate_record, RecordError};
use waybill_types::{GatewayError, RecordKey, SaveState};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredMonth {
    #[serde(default)]
    pub seeds: Option<MonthSeeds>,
    #[serde(default)]
    pub weather_enabled: Option<bool>,
    #[serde(default)]
    pub saved_days: BTreeSet<u32>,
    /// Records in chain order
    #[serde(default)]
    pub records: Vec<DayRecord>,
}

impl StoredMonth {
    pub fn to_loaded(&self) -> LoadedMonth {
        LoadedMonth {
            records: self.records.clone(),
            saved_days: self.saved_days.clone(),
            seeds: self.seeds,
            weather_enabled: self.weather_enabled,
        }
    }

    fn get(&self, key: RecordKey) -> Option<&DayRecord> {
        self.records.iter().find(|r| r.key() == key)
    }

    /// Odometer and fuel the next day starts from once `day` (and its night
    /// shift) are taken into account
    fn closing_after(&self, day: u32) -> Option<(u64, f64)> {
        self.get(RecordKey::night(day))
            .or_else(|| self.get(RecordKey::day(day)))
            .and_then(DayRecord::end_values)
    }

    fn upsert(&mut self, record: DayRecord) {
        let record = stored(record);
        let key = record.key();
        match self.records.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record,
            None => {
                self.records.push(record);
                self.records.sort_by_key(DayRecord::key);
            }
        }
    }

    fn remove(&mut self, key: RecordKey) {
        self.records.retain(|r| r.key() != key);
    }

    /// Persist one day and the night shift following it
    pub fn apply_day(&mut self, day: u32, payload: DayPayload) -> Result<(), GatewayError> {
        if payload.record.key() != RecordKey::day(day) {
            return Err(GatewayError::Rejected(format!(
                "payload holds record {} but day {} was addressed",
                payload.record.key(),
                day
            )));
        }
        if let Some(night) = &payload.night_shift {
            if night.key() != RecordKey::night(day) {
                return Err(GatewayError::Rejected(format!(
                    "night shift {} does not follow day {}",
                    night.key(),
                    day
                )));
            }
        }

        if day > 1 && !self.saved_days.contains(&(day - 1)) {
            return Err(GatewayError::Sequence {
                day,
                missing: day - 1,
            });
        }

        let mut issues = blocking(&validate_for_commit(&payload.record));
        if let Some(night) = &payload.night_shift {
            issues.extend(blocking(&validate_record(night)));
        }
        if !issues.is_empty() {
            let messages: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
            return Err(GatewayError::Rejected(messages.join("; ")));
        }

        let closing_before = self.closing_after(day);
        if let Some(seeds) = payload.seeds {
            self.seeds = Some(seeds);
        }
        self.weather_enabled = Some(payload.weather_enabled);
        self.upsert(payload.record);
        match payload.night_shift {
            Some(night) => self.upsert(night),
            None => self.remove(RecordKey::night(day)),
        }

        // Later days were saved against the old closing values
        if closing_before.is_some() && closing_before != self.closing_after(day) {
            let stale: Vec<u32> = self.saved_days.range(day + 1..).copied().collect();
            if !stale.is_empty() {
                log::info!("Day {} changed; {} later day(s) need saving again", day, stale.len());
            }
            self.saved_days.retain(|d| *d <= day);
        }
        self.saved_days.insert(day);
        Ok(())
    }

    /// Replace the whole month, or report every record that fails validation
    pub fn apply_month(&mut self, snapshot: MonthSnapshot) -> MonthSaveResponse {
        let errors: Vec<RecordError> = snapshot
            .records
            .iter()
            .filter_map(|record| {
                let issues = blocking(&validate_record(record));
                (!issues.is_empty()).then(|| RecordError {
                    key: record.key(),
                    issues,
                })
            })
            .collect();
        if !errors.is_empty() {
            return MonthSaveResponse {
                success: false,
                errors,
            };
        }

        self.seeds = Some(snapshot.seeds);
        self.weather_enabled = Some(snapshot.weather_enabled);
        self.saved_days = snapshot
            .records
            .iter()
            .filter(|r| !r.is_night_shift)
            .map(|r| r.day)
            .collect();
        let mut records: Vec<DayRecord> = snapshot.records.into_iter().map(stored).collect();
        records.sort_by_key(DayRecord::key);
        self.records = records;

        MonthSaveResponse {
            success: true,
            errors: Vec::new(),
        }
    }
}

impl From<LoadedMonth> for StoredMonth {
    fn from(loaded: LoadedMonth) -> Self {
        Self {
            seeds: loaded.seeds,
            weather_enabled: loaded.weather_enabled,
            saved_days: loaded.saved_days,
            records: loaded.records,
        }
    }
}

fn stored(mut record: DayRecord) -> DayRecord {
    record.save_state = SaveState::Saved;
    record.dirty = false;
    record
}
