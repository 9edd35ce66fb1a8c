//! Per-day operational record of one vehicle

use serde::{Deserialize, Serialize};
use waybill_types::{RecordKey, SaveState};

use crate::model::VehicleProfile;
use crate::service::fuel_norm::compute_norm;
use crate::service::validation::ValidationIssue;

/// Fuel taken at one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelFill {
    pub station_id: String,
    pub quantity: f64,
}

/// Waste volume unloaded at one disposal site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteDelivery {
    pub polygon_id: String,
    pub volume: f64,
}

/// One calendar day (or one night shift) in a vehicle's monthly ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub day: u32,
    #[serde(default)]
    pub is_night_shift: bool,

    #[serde(default)]
    pub odometer_start: Option<u64>,
    /// Operator-entered kilometres
    #[serde(default)]
    pub distance_km: u32,
    #[serde(default)]
    pub odometer_end: Option<u64>,

    /// Disposal-site visits
    #[serde(default)]
    pub trip_count: u32,
    #[serde(default)]
    pub waste_volume_manual: Option<f64>,
    #[serde(default)]
    pub waste_deliveries: Vec<WasteDelivery>,
    #[serde(default)]
    pub waste_volume: f64,

    #[serde(default)]
    pub fuel_remaining_start: Option<f64>,
    #[serde(default)]
    pub fuel_taken: f64,
    #[serde(default)]
    pub fuel_fills: Vec<FuelFill>,
    #[serde(default)]
    pub fuel_norm: f64,
    #[serde(default)]
    pub fuel_remaining_end: Option<f64>,

    #[serde(default)]
    pub ambient_temperature: Option<f64>,

    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub loader_ids: Vec<String>,
    #[serde(default)]
    pub trip_number: Option<String>,

    /// Start values could not be derived yet
    #[serde(default)]
    pub provisional: bool,
    /// Local changes not yet persisted
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub save_state: SaveState,
    #[serde(default)]
    pub validation_errors: Vec<ValidationIssue>,

    #[serde(skip)]
    pub revision: u64,
}

/// A single operator edit
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
    Distance(u32),
    /// Entered as an odometer reading; converted into a distance
    OdometerEnd(u64),
    TripCount(u32),
    FuelTaken(f64),
    FuelFills(Vec<FuelFill>),
    WasteVolumeManual(Option<f64>),
    WasteDeliveries(Vec<WasteDelivery>),
    AmbientTemperature(Option<f64>),
    Driver(Option<String>),
    Loaders(Vec<String>),
    TripNumber(Option<String>),
}

impl FieldEdit {
    pub fn name(&self) -> &'static str {
        match self {
            FieldEdit::Distance(_) => "distance",
            FieldEdit::OdometerEnd(_) => "odometer_end",
            FieldEdit::TripCount(_) => "trip_count",
            FieldEdit::FuelTaken(_) => "fuel_taken",
            FieldEdit::FuelFills(_) => "fuel_fills",
            FieldEdit::WasteVolumeManual(_) => "waste_volume",
            FieldEdit::WasteDeliveries(_) => "waste_deliveries",
            FieldEdit::AmbientTemperature(_) => "temperature",
            FieldEdit::Driver(_) => "driver",
            FieldEdit::Loaders(_) => "loaders",
            FieldEdit::TripNumber(_) => "trip_number",
        }
    }
}

impl DayRecord {
    /// Empty record at `key`, start values not yet derived
    pub fn blank(key: RecordKey) -> Self {
        Self {
            day: key.day,
            is_night_shift: key.night,
            odometer_start: None,
            distance_km: 0,
            odometer_end: None,
            trip_count: 0,
            waste_volume_manual: None,
            waste_deliveries: Vec::new(),
            waste_volume: 0.0,
            fuel_remaining_start: None,
            fuel_taken: 0.0,
            fuel_fills: Vec::new(),
            fuel_norm: 0.0,
            fuel_remaining_end: None,
            ambient_temperature: None,
            driver_id: None,
            loader_ids: Vec::new(),
            trip_number: None,
            provisional: true,
            dirty: false,
            save_state: SaveState::NotSaved,
            validation_errors: Vec::new(),
            revision: 0,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            day: self.day,
            night: self.is_night_shift,
        }
    }

    /// Any operational quantity was entered
    pub fn has_activity(&self) -> bool {
        self.distance_km > 0 || self.trip_count > 0
    }

    /// End values as a `(odometer, fuel)` pair, if known
    pub fn end_values(&self) -> Option<(u64, f64)> {
        Some((self.odometer_end?, self.fuel_remaining_end?))
    }

    pub fn start_values(&self) -> Option<(u64, f64)> {
        Some((self.odometer_start?, self.fuel_remaining_start?))
    }

    /// Fuel available before the norm is deducted
    pub fn fuel_available(&self) -> Option<f64> {
        self.fuel_remaining_start.map(|start| start + self.fuel_taken)
    }

    /// Re-derive every computed field from `starts` and the record's own inputs.
    ///
    /// Returns true when any derived value changed.
    pub(crate) fn derive(
        &mut self,
        starts: Option<(u64, f64)>,
        vehicle: &VehicleProfile,
        weather_enabled: bool,
    ) -> bool {
        let before = self.derived_snapshot();

        if !self.fuel_fills.is_empty() {
            self.fuel_taken = self.fuel_fills.iter().map(|f| f.quantity).sum();
        }

        self.waste_volume = match self.waste_volume_manual {
            Some(manual) => manual,
            None if !self.waste_deliveries.is_empty() => {
                self.waste_deliveries.iter().map(|d| d.volume).sum()
            }
            None => self.trip_count as f64 * vehicle.capacity_m3,
        };

        self.fuel_norm = compute_norm(
            self.distance_km,
            self.trip_count,
            self.ambient_temperature,
            vehicle,
            weather_enabled,
        );

        match starts {
            Some((odometer, fuel)) => {
                self.odometer_start = Some(odometer);
                self.fuel_remaining_start = Some(fuel);
                match odometer.checked_add(u64::from(self.distance_km)) {
                    Some(end) => {
                        self.odometer_end = Some(end);
                        self.fuel_remaining_end =
                            Some((fuel + self.fuel_taken - self.fuel_norm).max(0.0));
                        self.provisional = false;
                    }
                    None => {
                        log::error!("Odometer overflow on day {}", self.key());
                        self.odometer_end = None;
                        self.fuel_remaining_end = None;
                        self.provisional = true;
                    }
                }
            }
            None => {
                self.odometer_start = None;
                self.odometer_end = None;
                self.fuel_remaining_start = None;
                self.fuel_remaining_end = None;
                self.provisional = true;
            }
        }

        before != self.derived_snapshot()
    }

    fn derived_snapshot(&self) -> DerivedSnapshot {
        DerivedSnapshot {
            odometer_start: self.odometer_start,
            odometer_end: self.odometer_end,
            fuel_remaining_start: self.fuel_remaining_start,
            fuel_remaining_end: self.fuel_remaining_end,
            fuel_taken: self.fuel_taken,
            fuel_norm: self.fuel_norm,
            waste_volume: self.waste_volume,
            provisional: self.provisional,
        }
    }
}

#[derive(PartialEq)]
struct DerivedSnapshot {
    odometer_start: Option<u64>,
    odometer_end: Option<u64>,
    fuel_remaining_start: Option<f64>,
    fuel_remaining_end: Option<f64>,
    fuel_taken: f64,
    fuel_norm: f64,
    waste_volume: f64,
    provisional: bool,
}
