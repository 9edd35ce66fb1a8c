//! Fleet master data loader from TOML
//!
//! One file carries every reference table the ledger screens need:
//! `[[vehicles]]`, `[[employees]]`, `[[fuel_stations]]` and `[[polygons]]`.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use waybill_domain::model::{Employee, EmployeeRole, FuelStation, Polygon, VehicleProfile};
use waybill_types::{ConfigError, Error, Result};

/// Container for parsing the master TOML
#[derive(Debug, Deserialize)]
struct FleetMasterFile {
    #[serde(default)]
    vehicles: Vec<VehicleProfile>,
    #[serde(default)]
    employees: Vec<Employee>,
    #[serde(default)]
    fuel_stations: Vec<FuelStation>,
    #[serde(default)]
    polygons: Vec<Polygon>,
}

/// Fleet master data loaded from TOML
#[derive(Debug)]
pub struct FleetMasterLoader {
    /// Map of vehicle_id to profile
    vehicles: HashMap<String, VehicleProfile>,
    employees: Vec<Employee>,
    fuel_stations: Vec<FuelStation>,
    polygons: Vec<Polygon>,
}

impl FleetMasterLoader {
    /// Load master data from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(ConfigError::ParseError(format!(
                "Failed to read fleet master file {}: {}",
                path.display(),
                e
            )))
        })?;

        Self::load_from_str(&content)
    }

    /// Load master data from a TOML string
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let file: FleetMasterFile = toml::from_str(toml_content).map_err(|e| {
            Error::MasterData(format!("Failed to parse fleet master TOML: {}", e))
        })?;

        for vehicle in &file.vehicles {
            if vehicle.capacity_m3 < 0.0
                || vehicle.fuel_consumption_per_100km < 0.0
                || vehicle.trip_fuel_consumption < 0.0
            {
                return Err(Error::MasterData(format!(
                    "Vehicle {} has a negative capacity or consumption",
                    vehicle.vehicle_id
                )));
            }
        }

        let vehicles = file
            .vehicles
            .into_iter()
            .map(|v| (v.vehicle_id.clone(), v))
            .collect();

        Ok(Self {
            vehicles,
            employees: file.employees,
            fuel_stations: file.fuel_stations,
            polygons: file.polygons,
        })
    }

    pub fn get_vehicle(&self, vehicle_id: &str) -> Option<&VehicleProfile> {
        self.vehicles.get(vehicle_id)
    }

    /// All vehicles, sorted by id
    pub fn all_vehicles(&self) -> Vec<&VehicleProfile> {
        let mut vehicles: Vec<_> = self.vehicles.values().collect();
        vehicles.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        vehicles
    }

    pub fn has_vehicle(&self, vehicle_id: &str) -> bool {
        self.vehicles.contains_key(vehicle_id)
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    /// Employees who may be assigned as driver
    pub fn drivers(&self) -> Vec<&Employee> {
        self.employees
            .iter()
            .filter(|e| e.role == EmployeeRole::Driver)
            .collect()
    }

    pub fn find_employee(&self, id: &str) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    pub fn fuel_stations(&self) -> &[FuelStation] {
        &self.fuel_stations
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Number of registered vehicles
    pub fn count(&self) -> usize {
        self.vehicles.len()
    }
}
