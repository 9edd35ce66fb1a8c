//! Vehicle master data used by the ledger

use serde::{Deserialize, Serialize};

/// Consumption and capacity constants of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    /// Garage / plate identifier
    pub vehicle_id: String,
    /// Body capacity (m³) per trip
    pub capacity_m3: f64,
    /// Diesel, petrol, methane...
    #[serde(default)]
    pub fuel_type: Option<String>,
    /// Litres per 100 km
    pub fuel_consumption_per_100km: f64,
    /// Litres per disposal-site visit
    #[serde(default)]
    pub trip_fuel_consumption: f64,
    /// Tank volume (litres)
    #[serde(default)]
    pub fuel_tank_volume: Option<f64>,
}

impl VehicleProfile {
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            capacity_m3: 0.0,
            fuel_type: None,
            fuel_consumption_per_100km: 0.0,
            trip_fuel_consumption: 0.0,
            fuel_tank_volume: None,
        }
    }

    pub fn with_capacity(mut self, capacity_m3: f64) -> Self {
        self.capacity_m3 = capacity_m3;
        self
    }

    pub fn with_consumption(mut self, per_100km: f64, per_trip: f64) -> Self {
        self.fuel_consumption_per_100km = per_100km;
        self.trip_fuel_consumption = per_trip;
        self
    }
}
