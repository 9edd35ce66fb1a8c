//! Cascade recalculation
//!
//! Start values depend only on the predecessor's end values, so an edit is
//! propagated by walking successor links and re-deriving each record until a
//! record comes out unchanged. Propagation is forward-only.

use waybill_types::RecordKey;

use super::{LedgerError, MonthLedger, MonthSeeds};
use crate::model::{FieldEdit, VehicleProfile};
use crate::repository::WeatherSource;
use crate::service::validation::{validate_record, ValidationIssue};

/// Result of an edit: which records changed, and any edit that was refused
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutcome {
    /// Records whose values changed, in chain order
    pub changed: Vec<RecordKey>,
    /// Validation issues raised instead of applying the edit
    pub rejected: Vec<ValidationIssue>,
}

impl CascadeOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.rejected.is_empty()
    }
}

impl MonthLedger {
    /// Apply one operator edit to `key` and propagate it forward
    pub fn on_field_changed(
        &mut self,
        key: RecordKey,
        edit: FieldEdit,
    ) -> Result<CascadeOutcome, LedgerError> {
        let field = edit.name();
        let start = self
            .get(key)
            .ok_or(LedgerError::UnknownRecord(key))?
            .odometer_start;
        let new_distance = match &edit {
            FieldEdit::Distance(km) => Some(*km),
            FieldEdit::OdometerEnd(end) => match start {
                Some(start) if *end >= start => Some(distance_between(field, start, *end)?),
                _ => None,
            },
            _ => None,
        };
        if let Some(km) = new_distance {
            self.check_odometer_range(field, self.seeds.odometer, Some((key, km)))?;
        }

        let record = self
            .record_mut(key)
            .ok_or(LedgerError::UnknownRecord(key))?;
        let before = record.clone();

        let mut rejected = Vec::new();
        match edit {
            FieldEdit::Distance(km) => record.distance_km = km,
            FieldEdit::OdometerEnd(end) => match record.odometer_start {
                Some(start) if end >= start => {
                    record.distance_km = distance_between(field, start, end)?;
                }
                Some(start) => rejected.push(ValidationIssue::OdometerBackwards { start, end }),
                None => {
                    return Err(LedgerError::InvalidValue {
                        field,
                        reason: "odometer start is not known yet".to_string(),
                    })
                }
            },
            FieldEdit::TripCount(trips) => record.trip_count = trips,
            FieldEdit::FuelTaken(quantity) => {
                check_quantity(field, quantity)?;
                record.fuel_fills.clear();
                record.fuel_taken = quantity;
            }
            FieldEdit::FuelFills(fills) => {
                for fill in &fills {
                    check_quantity(field, fill.quantity)?;
                }
                if fills.is_empty() {
                    record.fuel_taken = 0.0;
                }
                record.fuel_fills = fills;
            }
            FieldEdit::WasteVolumeManual(volume) => {
                if let Some(v) = volume {
                    check_quantity(field, v)?;
                }
                record.waste_volume_manual = volume;
            }
            FieldEdit::WasteDeliveries(deliveries) => {
                for delivery in &deliveries {
                    check_quantity(field, delivery.volume)?;
                }
                record.waste_deliveries = deliveries;
            }
            FieldEdit::AmbientTemperature(t) => {
                if matches!(t, Some(v) if !v.is_finite()) {
                    return Err(LedgerError::InvalidValue {
                        field,
                        reason: "temperature is not a number".to_string(),
                    });
                }
                record.ambient_temperature = t;
            }
            FieldEdit::Driver(driver) => record.driver_id = driver,
            FieldEdit::Loaders(loaders) => record.loader_ids = loaders,
            FieldEdit::TripNumber(number) => record.trip_number = number,
        }

        let input_changed = *record != before;
        if input_changed {
            record.revision += 1;
        }

        let mut changed = self.recompute_from(key);
        if input_changed && !changed.contains(&key) {
            changed.insert(0, key);
        }

        if !rejected.is_empty() {
            if let Some(record) = self.record_mut(key) {
                record.validation_errors.extend(rejected.iter().cloned());
            }
            log::debug!("Edit of {} on day {} rejected: {:?}", field, key, rejected);
        }

        self.mark_changed(&changed);
        self.verify_after_mutation()?;
        log::debug!(
            "Edit of {} on day {} touched {} record(s)",
            field,
            key,
            changed.len()
        );
        Ok(CascadeOutcome { changed, rejected })
    }

    /// Replace the day-1 seeds and propagate from the head of the chain
    pub fn set_seeds(&mut self, seeds: MonthSeeds) -> Result<CascadeOutcome, LedgerError> {
        if !seeds.fuel.is_finite() || seeds.fuel < 0.0 {
            return Err(LedgerError::InvalidValue {
                field: "seed_fuel",
                reason: format!("{} is not a valid fuel balance", seeds.fuel),
            });
        }
        self.check_odometer_range("seed_odometer", seeds.odometer, None)?;
        self.seeds = seeds;
        let changed = match self.head {
            Some(head) => self.recompute_from(head),
            None => Vec::new(),
        };
        self.finish_global(changed)
    }

    /// Refuse values that would push the month's closing odometer past `u64::MAX`.
    ///
    /// The closing reading is bounded by the seed plus every distance in the
    /// ledger; `replace` substitutes a pending distance for one record.
    fn check_odometer_range(
        &self,
        field: &'static str,
        seed: u64,
        replace: Option<(RecordKey, u32)>,
    ) -> Result<(), LedgerError> {
        let mut total = seed;
        for node in self.nodes.values() {
            let km = match replace {
                Some((key, km)) if key == node.record.key() => km,
                _ => node.record.distance_km,
            };
            total = total
                .checked_add(u64::from(km))
                .ok_or_else(|| LedgerError::InvalidValue {
                    field,
                    reason: format!("odometer would exceed {} km", u64::MAX),
                })?;
        }
        Ok(())
    }

    /// Swap the vehicle constants and recompute every record
    pub fn set_vehicle(&mut self, vehicle: VehicleProfile) -> Result<CascadeOutcome, LedgerError> {
        self.vehicle = vehicle;
        let changed = self.recompute_all();
        self.finish_global(changed)
    }

    pub fn set_weather_enabled(&mut self, enabled: bool) -> Result<CascadeOutcome, LedgerError> {
        if self.weather_enabled == enabled {
            return Ok(CascadeOutcome::default());
        }
        self.weather_enabled = enabled;
        let changed = self.recompute_all();
        self.finish_global(changed)
    }

    /// Fill in ambient temperatures from `source`.
    ///
    /// Days that already carry a temperature keep it unless `overwrite` is set.
    pub fn apply_weather(
        &mut self,
        source: &dyn WeatherSource,
        overwrite: bool,
    ) -> Result<CascadeOutcome, LedgerError> {
        let month = self.month;
        let mut touched = Vec::new();
        for node in self.nodes.values_mut() {
            let record = &mut node.record;
            if record.ambient_temperature.is_some() && !overwrite {
                continue;
            }
            let Some(date) = month.date(record.day) else {
                continue;
            };
            let Some(t) = source.temperature_on(date) else {
                continue;
            };
            if record.ambient_temperature != Some(t) {
                record.ambient_temperature = Some(t);
                record.revision += 1;
                touched.push(record.key());
            }
        }

        let mut changed = self.recompute_all();
        for key in touched {
            if !changed.contains(&key) {
                changed.push(key);
            }
        }
        changed.sort();
        self.finish_global(changed)
    }

    fn finish_global(&mut self, changed: Vec<RecordKey>) -> Result<CascadeOutcome, LedgerError> {
        self.mark_changed(&changed);
        self.verify_after_mutation()?;
        Ok(CascadeOutcome {
            changed,
            rejected: Vec::new(),
        })
    }

    /// Re-derive `start` and then its successors until one is unchanged
    pub(crate) fn recompute_from(&mut self, start: RecordKey) -> Vec<RecordKey> {
        self.walk(Some(start), false)
    }

    /// Re-derive every record from the head of the chain
    pub(crate) fn recompute_all(&mut self) -> Vec<RecordKey> {
        self.walk(self.head, true)
    }

    fn walk(&mut self, start: Option<RecordKey>, exhaustive: bool) -> Vec<RecordKey> {
        let mut changed = Vec::new();
        let mut cursor = start;
        let mut first = true;

        while let Some(key) = cursor {
            let starts = self.feeding_values(key);
            let vehicle = &self.vehicle;
            let weather_enabled = self.weather_enabled;
            let Some(node) = self.nodes.get_mut(&key) else {
                break;
            };

            let did_change = node.record.derive(starts, vehicle, weather_enabled);
            node.record.validation_errors = validate_record(&node.record);
            if did_change {
                node.record.revision += 1;
                changed.push(key);
            } else if !first && !exhaustive {
                break;
            }

            first = false;
            cursor = node.next;
        }
        changed
    }
}

fn distance_between(field: &'static str, start: u64, end: u64) -> Result<u32, LedgerError> {
    u32::try_from(end - start).map_err(|_| LedgerError::InvalidValue {
        field,
        reason: format!("{} km in one day", end - start),
    })
}

fn check_quantity(field: &'static str, value: f64) -> Result<(), LedgerError> {
    if !value.is_finite() || value < 0.0 {
        return Err(LedgerError::InvalidValue {
            field,
            reason: format!("{} is not a valid quantity", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::model::FuelFill;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn assert_chain(ledger: &MonthLedger) {
        let records = ledger.records();
        for pair in records.windows(2) {
            assert_eq!(pair[1].odometer_start, pair[0].odometer_end, "at {}", pair[1].key());
            assert_eq!(
                pair[1].fuel_remaining_start,
                pair[0].fuel_remaining_end,
                "at {}",
                pair[1].key()
            );
        }
    }

    #[test]
    fn test_scenario_day_one_feeds_day_two() {
        let mut ledger = seeded_ledger();
        let day1 = RecordKey::day(1);
        ledger.on_field_changed(day1, FieldEdit::Distance(120)).unwrap();
        ledger.on_field_changed(day1, FieldEdit::FuelTaken(30.0)).unwrap();
        ledger.on_field_changed(day1, FieldEdit::TripCount(2)).unwrap();

        let record = ledger.day(1).unwrap();
        assert_eq!(record.odometer_end, Some(10_120));
        assert!((record.fuel_norm - 36.4).abs() < 1e-9);
        assert!((record.fuel_remaining_end.unwrap() - 43.6).abs() < 1e-9);

        let day2 = ledger.day(2).unwrap();
        assert_eq!(day2.odometer_start, Some(10_120));
        assert_eq!(day2.fuel_remaining_start, record.fuel_remaining_end);
    }

    #[test]
    fn test_forward_only_propagation() {
        let mut ledger = seeded_ledger();
        for day in 1..=10 {
            ledger
                .on_field_changed(RecordKey::day(day), FieldEdit::Distance(50))
                .unwrap();
        }
        let before: Vec<_> = ledger.records().into_iter().cloned().collect();

        ledger
            .on_field_changed(RecordKey::day(5), FieldEdit::Distance(80))
            .unwrap();

        for (old, new) in before.iter().zip(ledger.records()) {
            if old.day < 5 {
                assert_eq!(old.odometer_start, new.odometer_start);
                assert_eq!(old.odometer_end, new.odometer_end);
                assert_eq!(old.revision, new.revision);
            } else if old.day > 5 {
                assert_eq!(new.odometer_start.unwrap(), old.odometer_start.unwrap() + 30);
                assert_eq!(new.odometer_end.unwrap(), old.odometer_end.unwrap() + 30);
            }
        }
        assert_chain(&ledger);
    }

    #[test]
    fn test_chain_holds_after_edit_sequence() {
        let mut ledger = seeded_ledger();
        let edits = [
            (3, FieldEdit::Distance(140)),
            (1, FieldEdit::FuelTaken(60.0)),
            (3, FieldEdit::TripCount(4)),
            (2, FieldEdit::Distance(35)),
            (20, FieldEdit::FuelFills(vec![FuelFill {
                station_id: "S1".to_string(),
                quantity: 45.0,
            }])),
            (3, FieldEdit::AmbientTemperature(Some(-8.0))),
            (1, FieldEdit::Distance(0)),
            (31, FieldEdit::Distance(12)),
        ];
        for (day, edit) in edits {
            ledger.on_field_changed(RecordKey::day(day), edit).unwrap();
            assert_chain(&ledger);
            assert!(ledger.verify_chain().is_ok());
        }
    }

    #[test]
    fn test_identical_edit_is_noop() {
        let mut ledger = seeded_ledger();
        ledger
            .on_field_changed(RecordKey::day(4), FieldEdit::Distance(20))
            .unwrap();
        let outcome = ledger
            .on_field_changed(RecordKey::day(4), FieldEdit::Distance(20))
            .unwrap();
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_driver_edit_does_not_cascade() {
        let mut ledger = seeded_ledger();
        let outcome = ledger
            .on_field_changed(RecordKey::day(4), FieldEdit::Driver(Some("D-1".to_string())))
            .unwrap();
        assert_eq!(outcome.changed, vec![RecordKey::day(4)]);
    }

    #[test]
    fn test_odometer_end_converts_to_distance() {
        let mut ledger = seeded_ledger();
        ledger
            .on_field_changed(RecordKey::day(1), FieldEdit::OdometerEnd(10_075))
            .unwrap();
        assert_eq!(ledger.day(1).unwrap().distance_km, 75);
        assert_eq!(ledger.day(2).unwrap().odometer_start, Some(10_075));
    }

    #[test]
    fn test_odometer_end_below_start_is_rejected_not_applied() {
        let mut ledger = seeded_ledger();
        let outcome = ledger
            .on_field_changed(RecordKey::day(1), FieldEdit::OdometerEnd(9_000))
            .unwrap();
        assert_eq!(
            outcome.rejected,
            vec![ValidationIssue::OdometerBackwards {
                start: 10_000,
                end: 9_000
            }]
        );
        let day1 = ledger.day(1).unwrap();
        assert_eq!(day1.distance_km, 0);
        assert!(day1
            .validation_errors
            .contains(&ValidationIssue::OdometerBackwards {
                start: 10_000,
                end: 9_000
            }));
    }

    #[test]
    fn test_negative_fuel_is_invalid() {
        let mut ledger = seeded_ledger();
        let err = ledger
            .on_field_changed(RecordKey::day(2), FieldEdit::FuelTaken(-5.0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidValue { field: "fuel_taken", .. }));
        assert_eq!(ledger.day(2).unwrap().fuel_taken, 0.0);
    }

    #[test]
    fn test_unknown_day_is_error() {
        let mut ledger = seeded_ledger();
        let err = ledger
            .on_field_changed(RecordKey::night(2), FieldEdit::Distance(1))
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownRecord(RecordKey::night(2)));
    }

    #[test]
    fn test_seed_change_propagates_from_day_one() {
        let mut ledger = seeded_ledger();
        ledger
            .on_field_changed(RecordKey::day(2), FieldEdit::Distance(10))
            .unwrap();
        let outcome = ledger
            .set_seeds(MonthSeeds {
                odometer: 20_000,
                fuel: 80.0,
            })
            .unwrap();
        assert_eq!(outcome.changed.len(), 31);
        assert_eq!(ledger.day(1).unwrap().odometer_start, Some(20_000));
        assert_eq!(ledger.day(31).unwrap().odometer_end, Some(20_010));
        assert_chain(&ledger);
    }

    #[test]
    fn test_weather_toggle_recomputes_norms() {
        let mut ledger = seeded_ledger();
        let day1 = RecordKey::day(1);
        ledger.on_field_changed(day1, FieldEdit::Distance(100)).unwrap();
        ledger
            .on_field_changed(day1, FieldEdit::AmbientTemperature(Some(-3.0)))
            .unwrap();
        assert!((ledger.day(1).unwrap().fuel_norm - 27.0).abs() < 1e-9);

        ledger.set_weather_enabled(true).unwrap();
        assert!((ledger.day(1).unwrap().fuel_norm - 28.35).abs() < 1e-9);
        assert_chain(&ledger);
    }

    #[test]
    fn test_apply_weather_fills_unknown_days_only() {
        let mut ledger = seeded_ledger();
        ledger
            .on_field_changed(RecordKey::day(2), FieldEdit::AmbientTemperature(Some(4.0)))
            .unwrap();

        let mut temps = BTreeMap::new();
        temps.insert(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), -6.0);
        temps.insert(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), -2.0);
        ledger.apply_weather(&temps, false).unwrap();

        assert_eq!(ledger.day(1).unwrap().ambient_temperature, Some(-6.0));
        assert_eq!(ledger.day(2).unwrap().ambient_temperature, Some(4.0));
        assert_eq!(ledger.day(3).unwrap().ambient_temperature, None);

        ledger.apply_weather(&temps, true).unwrap();
        assert_eq!(ledger.day(2).unwrap().ambient_temperature, Some(-2.0));
    }

    #[test]
    fn test_vehicle_change_recomputes_norms() {
        let mut ledger = seeded_ledger();
        ledger
            .on_field_changed(RecordKey::day(1), FieldEdit::Distance(200))
            .unwrap();
        ledger
            .set_vehicle(truck().with_consumption(30.0, 2.0))
            .unwrap();
        assert!((ledger.day(1).unwrap().fuel_norm - 60.0).abs() < 1e-9);
        assert_eq!(ledger.day(1).unwrap().fuel_remaining_end, Some(0.0));
        assert_chain(&ledger);
    }
}
