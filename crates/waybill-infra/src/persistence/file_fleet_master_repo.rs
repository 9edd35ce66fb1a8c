//! File-based implementation of FleetMasterRepository

use std::path::{Path, PathBuf};

use waybill_domain::model::{Employee, FuelStation, Polygon, VehicleProfile};
use waybill_domain::repository::FleetMasterRepository;
use waybill_types::Error;

use crate::fleet_master_loader::FleetMasterLoader;

/// Fleet master repository backed by a TOML file
pub struct FileFleetMasterRepository {
    toml_path: PathBuf,
    loader: FleetMasterLoader,
}

impl FileFleetMasterRepository {
    pub fn new(toml_path: PathBuf) -> Result<Self, Error> {
        let loader = FleetMasterLoader::load_from_file(&toml_path)?;
        log::debug!(
            "Loaded {} vehicle(s) from {}",
            loader.count(),
            toml_path.display()
        );
        Ok(Self { toml_path, loader })
    }

    pub fn toml_path(&self) -> &Path {
        &self.toml_path
    }

    /// Reload data from TOML
    pub fn reload(&mut self) -> Result<(), Error> {
        self.loader = FleetMasterLoader::load_from_file(&self.toml_path)?;
        Ok(())
    }
}

impl FleetMasterRepository for FileFleetMasterRepository {
    fn find_vehicle(&self, vehicle_id: &str) -> Result<Option<VehicleProfile>, Error> {
        Ok(self.loader.get_vehicle(vehicle_id).cloned())
    }

    fn vehicles(&self) -> Result<Vec<VehicleProfile>, Error> {
        Ok(self.loader.all_vehicles().into_iter().cloned().collect())
    }

    fn employees(&self) -> Result<Vec<Employee>, Error> {
        Ok(self.loader.employees().to_vec())
    }

    fn fuel_stations(&self) -> Result<Vec<FuelStation>, Error> {
        Ok(self.loader.fuel_stations().to_vec())
    }

    fn polygons(&self) -> Result<Vec<Polygon>, Error> {
        Ok(self.loader.polygons().to_vec())
    }
}
