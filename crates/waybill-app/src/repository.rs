//! Repository adapters for persistence layer

use std::path::PathBuf;
use std::sync::Arc;

use waybill_domain::model::VehicleProfile;
use waybill_domain::repository::{FleetMasterRepository, PersistenceGateway};
use waybill_infra::persistence::{
    FileFleetMasterRepository, FileLedgerGateway, InMemoryGateway, StoredMonth,
};
use waybill_infra::CsvWeatherSource;
use waybill_store::DraftStore;
use waybill_types::{Error, Result, YearMonth};

use crate::config::Config;

/// Open the file-based ledger gateway under the data directory
pub fn open_ledger_gateway(config: &Config) -> Result<FileLedgerGateway> {
    let data_dir = config.data_dir()?;
    Ok(FileLedgerGateway::new(&data_dir))
}

/// In-memory gateway mirroring the stored month and the one before it.
///
/// Saves go through the same rules as the real backend but are thrown away.
pub async fn open_dry_run_gateway(
    config: &Config,
    vehicle_id: &str,
    month: YearMonth,
) -> Result<InMemoryGateway> {
    let file_gateway = open_ledger_gateway(config)?;
    let memory = InMemoryGateway::new();
    for m in [month.previous(), month] {
        let loaded = file_gateway.load_month(vehicle_id, m).await?;
        memory.insert_month(vehicle_id, m, StoredMonth::from(loaded));
    }
    Ok(memory)
}

/// Gateway for this invocation: the file backend, or a dry-run mirror of it
pub async fn open_gateway(
    config: &Config,
    vehicle_id: &str,
    month: YearMonth,
    dry_run: bool,
) -> Result<Arc<dyn PersistenceGateway>> {
    if dry_run {
        log::info!("Dry run: saves are not persisted");
        Ok(Arc::new(open_dry_run_gateway(config, vehicle_id, month).await?))
    } else {
        Ok(Arc::new(open_ledger_gateway(config)?))
    }
}

/// Open the draft store
pub fn open_draft_store(config: &Config) -> Result<DraftStore> {
    DraftStore::open(config.drafts_dir()?)
}

/// Open the draft store at a custom directory
pub fn open_draft_store_at(store_dir: PathBuf) -> Result<DraftStore> {
    DraftStore::open(store_dir)
}

/// Open fleet master repository from TOML, if one is configured
pub fn open_fleet_master_repo(config: &Config) -> Result<Option<FileFleetMasterRepository>> {
    config
        .master_file
        .clone()
        .map(FileFleetMasterRepository::new)
        .transpose()
}

/// Load the weather CSV, if one is configured
pub fn open_weather_source(config: &Config) -> Result<Option<CsvWeatherSource>> {
    config
        .weather_file
        .as_deref()
        .map(CsvWeatherSource::load_from_file)
        .transpose()
}

/// Vehicle constants for `vehicle_id`.
///
/// With a master file the vehicle must be listed in it. Without one the
/// ledger runs with zero consumption constants.
pub fn resolve_vehicle(config: &Config, vehicle_id: &str) -> Result<VehicleProfile> {
    match open_fleet_master_repo(config)? {
        Some(repo) => repo.find_vehicle(vehicle_id)?.ok_or_else(|| {
            Error::MasterData(format!(
                "Vehicle {} is not in {}",
                vehicle_id,
                repo.toml_path().display()
            ))
        }),
        None => {
            log::warn!(
                "No master file configured; {} uses zero consumption constants",
                vehicle_id
            );
            Ok(VehicleProfile::new(vehicle_id))
        }
    }
}
