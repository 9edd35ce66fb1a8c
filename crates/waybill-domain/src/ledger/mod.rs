//! Monthly vehicle ledger
//!
//! A `MonthLedger` owns every record of one vehicle for one month. Records
//! are kept in an explicit doubly linked chain over a map keyed by
//! [`RecordKey`], so the predecessor and successor of any record are direct
//! lookups. After every mutation the chain invariant holds for each pair of
//! chain-adjacent records A → B:
//!
//! * `B.odometer_start == A.odometer_end`
//! * `B.fuel_remaining_start == A.fuel_remaining_end`
//!
//! Day 1 takes its start values from the month seeds instead. A record whose
//! direct predecessor is not present is left provisional with unset start
//! values until the predecessor arrives.

mod cascade;
mod commit;
mod night_shift;

#[cfg(test)]
mod chain_tests;

pub use cascade::CascadeOutcome;
pub use commit::{CommitError, DaySaveTicket, MonthSaveTicket};
pub use night_shift::SpliceOutcome;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use waybill_types::{RecordKey, YearMonth};

use crate::model::{DayRecord, VehicleProfile};

/// Operator-set values that seed day 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthSeeds {
    pub odometer: u64,
    pub fuel: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("No record {0} in this ledger")]
    UnknownRecord(RecordKey),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Chain broken at {at}: {detail}")]
    ChainViolation { at: RecordKey, detail: String },
}

#[derive(Debug, Clone)]
struct ChainNode {
    record: DayRecord,
    prev: Option<RecordKey>,
    next: Option<RecordKey>,
}

/// Ledger of one vehicle for one calendar month
#[derive(Debug, Clone)]
pub struct MonthLedger {
    month: YearMonth,
    vehicle: VehicleProfile,
    seeds: MonthSeeds,
    weather_enabled: bool,
    nodes: HashMap<RecordKey, ChainNode>,
    head: Option<RecordKey>,
    tail: Option<RecordKey>,
    days_in_flight: BTreeSet<u32>,
    month_in_flight: bool,
}

impl MonthLedger {
    /// Ledger with one blank record per calendar day
    pub fn new(
        vehicle: VehicleProfile,
        month: YearMonth,
        seeds: MonthSeeds,
        weather_enabled: bool,
    ) -> Self {
        let mut ledger = Self::empty(vehicle, month, seeds, weather_enabled);
        for day in 1..=month.days_in_month() {
            ledger.link(DayRecord::blank(RecordKey::day(day)));
        }
        ledger.recompute_all();
        ledger.normalize_save_states();
        ledger
    }

    /// Ledger without any records; populate with [`MonthLedger::overlay`]
    pub fn empty(
        vehicle: VehicleProfile,
        month: YearMonth,
        seeds: MonthSeeds,
        weather_enabled: bool,
    ) -> Self {
        Self {
            month,
            vehicle,
            seeds,
            weather_enabled,
            nodes: HashMap::new(),
            head: None,
            tail: None,
            days_in_flight: BTreeSet::new(),
            month_in_flight: false,
        }
    }

    pub fn month(&self) -> YearMonth {
        self.month
    }

    pub fn vehicle(&self) -> &VehicleProfile {
        &self.vehicle
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle.vehicle_id
    }

    pub fn seeds(&self) -> MonthSeeds {
        self.seeds
    }

    pub fn weather_enabled(&self) -> bool {
        self.weather_enabled
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, key: RecordKey) -> Option<&DayRecord> {
        self.nodes.get(&key).map(|n| &n.record)
    }

    pub fn day(&self, day: u32) -> Option<&DayRecord> {
        self.get(RecordKey::day(day))
    }

    pub fn night_shift_after(&self, day: u32) -> Option<&DayRecord> {
        self.get(RecordKey::night(day))
    }

    pub fn predecessor(&self, key: RecordKey) -> Option<RecordKey> {
        self.nodes.get(&key).and_then(|n| n.prev)
    }

    pub fn successor(&self, key: RecordKey) -> Option<RecordKey> {
        self.nodes.get(&key).and_then(|n| n.next)
    }

    /// Records in chain order
    pub fn records(&self) -> Vec<&DayRecord> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let Some(node) = self.nodes.get(&key) else {
                break;
            };
            out.push(&node.record);
            cursor = node.next;
        }
        out
    }

    pub fn keys(&self) -> Vec<RecordKey> {
        self.records().into_iter().map(DayRecord::key).collect()
    }

    /// End values of the last record, used to seed the following month
    pub fn closing_values(&self) -> Option<MonthSeeds> {
        let tail = self.tail?;
        let (odometer, fuel) = self.get(tail)?.end_values()?;
        Some(MonthSeeds { odometer, fuel })
    }

    /// Merge persisted records into the ledger and re-derive the chain.
    ///
    /// Existing records at the same key are replaced. Start values carried by
    /// the incoming records are ignored in favour of the chain.
    pub fn overlay(&mut self, records: Vec<DayRecord>) -> Result<CascadeOutcome, LedgerError> {
        for record in records {
            self.check_key(record.key())?;
            if record.is_night_shift && !self.nodes.contains_key(&RecordKey::day(record.day)) {
                log::warn!(
                    "Night shift after day {} has no day record; loading it provisional",
                    record.day
                );
            }
            self.replace_or_link(record);
        }
        let changed = self.recompute_all();
        self.normalize_save_states();
        self.verify_after_mutation()?;
        Ok(CascadeOutcome {
            changed,
            rejected: Vec::new(),
        })
    }

    /// Add (or replace) one record and propagate from it
    pub fn insert_record(&mut self, record: DayRecord) -> Result<CascadeOutcome, LedgerError> {
        let key = record.key();
        self.check_key(key)?;
        self.replace_or_link(record);
        let changed = self.recompute_from(key);
        self.normalize_save_states();
        self.verify_after_mutation()?;
        Ok(CascadeOutcome {
            changed,
            rejected: Vec::new(),
        })
    }

    /// Walk the chain and confirm links and start/end linkage are consistent
    pub fn verify_chain(&self) -> Result<(), LedgerError> {
        let mut visited = 0usize;
        let mut prev: Option<RecordKey> = None;
        let mut cursor = self.head;

        while let Some(key) = cursor {
            let node = self.nodes.get(&key).ok_or_else(|| LedgerError::ChainViolation {
                at: key,
                detail: "linked key has no record".to_string(),
            })?;

            if node.prev != prev {
                return Err(LedgerError::ChainViolation {
                    at: key,
                    detail: format!("back link {:?} does not match {:?}", node.prev, prev),
                });
            }
            if let Some(p) = prev {
                if p >= key {
                    return Err(LedgerError::ChainViolation {
                        at: key,
                        detail: format!("out of order after {}", p),
                    });
                }
            }
            if node.record.key() != key {
                return Err(LedgerError::ChainViolation {
                    at: key,
                    detail: format!("stored under wrong key {}", node.record.key()),
                });
            }

            let expected = self.feeding_values(key);
            let actual = node.record.start_values();
            if actual != expected {
                return Err(LedgerError::ChainViolation {
                    at: key,
                    detail: format!("start {:?} but predecessor ends at {:?}", actual, expected),
                });
            }

            visited += 1;
            prev = Some(key);
            cursor = node.next;
        }

        if prev != self.tail {
            return Err(LedgerError::ChainViolation {
                at: prev.unwrap_or(RecordKey::day(0)),
                detail: "tail does not match last linked record".to_string(),
            });
        }
        if visited != self.nodes.len() {
            return Err(LedgerError::ChainViolation {
                at: prev.unwrap_or(RecordKey::day(0)),
                detail: format!("{} records unreachable from head", self.nodes.len() - visited),
            });
        }
        Ok(())
    }

    fn verify_after_mutation(&self) -> Result<(), LedgerError> {
        let result = self.verify_chain().inspect_err(|e| {
            log::error!(
                "Ledger {} {} failed chain check: {}",
                self.vehicle.vehicle_id,
                self.month,
                e
            );
        });
        debug_assert!(result.is_ok(), "chain check failed: {:?}", result);
        result
    }

    fn check_key(&self, key: RecordKey) -> Result<(), LedgerError> {
        if key.day == 0 || key.day > self.month.days_in_month() {
            return Err(LedgerError::UnknownRecord(key));
        }
        Ok(())
    }

    /// Start values that `key` must carry: the seeds for day 1, otherwise the
    /// end values of its direct predecessor when that record is present.
    fn feeding_values(&self, key: RecordKey) -> Option<(u64, f64)> {
        if key == RecordKey::day(1) {
            return Some((self.seeds.odometer, self.seeds.fuel));
        }
        let prev = self.nodes.get(&key)?.prev?;
        let candidates = key.direct_predecessors();
        if !candidates.contains(&Some(prev)) {
            return None;
        }
        self.nodes.get(&prev)?.record.end_values()
    }

    pub(crate) fn record_mut(&mut self, key: RecordKey) -> Option<&mut DayRecord> {
        self.nodes.get_mut(&key).map(|n| &mut n.record)
    }

    fn replace_or_link(&mut self, mut record: DayRecord) {
        let key = record.key();
        if let Some(node) = self.nodes.get_mut(&key) {
            record.revision = node.record.revision + 1;
            node.record = record;
        } else {
            self.link(record);
        }
    }

    /// Insert a record into the chain at its ordered position
    fn link(&mut self, record: DayRecord) {
        let key = record.key();

        // Walk back from the tail to the last key ordered before this one
        let mut prev = self.tail;
        while let Some(p) = prev {
            if p < key {
                break;
            }
            prev = self.nodes.get(&p).and_then(|n| n.prev);
        }
        let next = match prev {
            Some(p) => self.nodes.get(&p).and_then(|n| n.next),
            None => self.head,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.next = Some(key);
                }
            }
            None => self.head = Some(key),
        }
        match next {
            Some(n) => {
                if let Some(node) = self.nodes.get_mut(&n) {
                    node.prev = Some(key);
                }
            }
            None => self.tail = Some(key),
        }

        self.nodes.insert(key, ChainNode { record, prev, next });
    }

    /// Remove a record from the chain, returning it and its former successor
    fn unlink(&mut self, key: RecordKey) -> Option<(DayRecord, Option<RecordKey>)> {
        let node = self.nodes.remove(&key)?;
        match node.prev {
            Some(p) => {
                if let Some(prev) = self.nodes.get_mut(&p) {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.nodes.get_mut(&n) {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        Some((node.record, node.next))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_new_ledger_has_every_day_linked() {
        let ledger = seeded_ledger();
        assert_eq!(ledger.len(), 31);
        let keys = ledger.keys();
        assert_eq!(keys.first(), Some(&RecordKey::day(1)));
        assert_eq!(keys.last(), Some(&RecordKey::day(31)));
        assert_eq!(ledger.predecessor(RecordKey::day(2)), Some(RecordKey::day(1)));
        assert_eq!(ledger.successor(RecordKey::day(2)), Some(RecordKey::day(3)));
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn test_blank_days_carry_seed_values() {
        let ledger = seeded_ledger();
        for record in ledger.records() {
            assert_eq!(record.odometer_start, Some(10_000));
            assert_eq!(record.fuel_remaining_end, Some(50.0));
            assert!(!record.provisional);
        }
        assert_eq!(
            ledger.closing_values(),
            Some(MonthSeeds {
                odometer: 10_000,
                fuel: 50.0
            })
        );
    }

    #[test]
    fn test_sparse_ledger_marks_orphans_provisional() {
        let mut ledger = MonthLedger::empty(truck(), march(), MonthSeeds::default(), false);
        let mut day3 = DayRecord::blank(RecordKey::day(3));
        day3.distance_km = 40;
        ledger.overlay(vec![day3]).unwrap();

        let day3 = ledger.day(3).unwrap();
        assert!(day3.provisional);
        assert_eq!(day3.odometer_start, None);
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn test_missing_predecessor_resumes_propagation() {
        let mut ledger = MonthLedger::empty(
            truck(),
            march(),
            MonthSeeds {
                odometer: 500,
                fuel: 20.0,
            },
            false,
        );
        let mut day2 = DayRecord::blank(RecordKey::day(2));
        day2.distance_km = 15;
        ledger.overlay(vec![day2]).unwrap();
        assert!(ledger.day(2).unwrap().provisional);

        let mut day1 = DayRecord::blank(RecordKey::day(1));
        day1.distance_km = 10;
        let outcome = ledger.insert_record(day1).unwrap();

        assert!(outcome.changed.contains(&RecordKey::day(2)));
        let day2 = ledger.day(2).unwrap();
        assert!(!day2.provisional);
        assert_eq!(day2.odometer_start, Some(510));
        assert_eq!(day2.odometer_end, Some(525));
    }

    #[test]
    fn test_overlay_replaces_and_rederives() {
        let mut ledger = seeded_ledger();
        let mut persisted = DayRecord::blank(RecordKey::day(1));
        persisted.distance_km = 100;
        // Stale start values from storage are overridden by the chain
        persisted.odometer_start = Some(1);
        ledger.overlay(vec![persisted]).unwrap();

        assert_eq!(ledger.day(1).unwrap().odometer_start, Some(10_000));
        assert_eq!(ledger.day(2).unwrap().odometer_start, Some(10_100));
    }

    #[test]
    fn test_overlay_rejects_day_outside_month() {
        let mut ledger = seeded_ledger();
        let result = ledger.overlay(vec![DayRecord::blank(RecordKey::day(32))]);
        assert_eq!(result, Err(LedgerError::UnknownRecord(RecordKey::day(32))));
    }

    #[test]
    fn test_verify_chain_detects_mismatch() {
        let mut ledger = seeded_ledger();
        corrupt(&mut ledger, RecordKey::day(7), 1);
        let err = ledger.verify_chain().unwrap_err();
        assert!(matches!(err, LedgerError::ChainViolation { at, .. } if at == RecordKey::day(7)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "chain check failed")]
    fn test_broken_chain_asserts_after_mutation() {
        let mut ledger = seeded_ledger();
        corrupt(&mut ledger, RecordKey::day(20), 1);
        let _ = ledger.on_field_changed(
            RecordKey::day(2),
            crate::model::FieldEdit::Driver(Some("D-1".to_string())),
        );
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_broken_chain_reported_after_mutation() {
        let mut ledger = seeded_ledger();
        corrupt(&mut ledger, RecordKey::day(20), 1);
        let err = ledger
            .on_field_changed(
                RecordKey::day(2),
                crate::model::FieldEdit::Driver(Some("D-1".to_string())),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::ChainViolation { at, .. } if at == RecordKey::day(20)));
    }

    #[test]
    fn test_seed_beyond_odometer_range_is_refused() {
        let mut ledger = seeded_ledger();
        ledger
            .on_field_changed(RecordKey::day(1), crate::model::FieldEdit::Distance(10))
            .unwrap();
        let err = ledger
            .set_seeds(MonthSeeds {
                odometer: u64::MAX - 5,
                fuel: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidValue { field: "seed_odometer", .. }));
        assert_eq!(ledger.seeds().odometer, 10_000);
        assert!(ledger.verify_chain().is_ok());
    }

    #[test]
    fn test_distance_beyond_odometer_range_is_refused() {
        let mut ledger = seeded_ledger();
        ledger
            .set_seeds(MonthSeeds {
                odometer: u64::MAX - 5,
                fuel: 1.0,
            })
            .unwrap();

        let err = ledger
            .on_field_changed(RecordKey::day(1), crate::model::FieldEdit::Distance(10))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidValue { .. }));
        assert_eq!(ledger.day(1).unwrap().distance_km, 0);

        ledger
            .on_field_changed(RecordKey::day(1), crate::model::FieldEdit::Distance(5))
            .unwrap();
        assert_eq!(ledger.closing_values().unwrap().odometer, u64::MAX);

        ledger
            .on_field_changed(RecordKey::day(1), crate::model::FieldEdit::Distance(0))
            .unwrap();
        ledger
            .on_field_changed(RecordKey::day(2), crate::model::FieldEdit::Distance(5))
            .unwrap();
        let err = ledger
            .on_field_changed(
                RecordKey::day(1),
                crate::model::FieldEdit::OdometerEnd(u64::MAX - 2),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidValue { .. }));
        assert!(ledger.verify_chain().is_ok());
    }
}
