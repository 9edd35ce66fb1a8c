//! Repository trait definitions for data persistence and reference data

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ledger::MonthSeeds;
use crate::model::{DayRecord, Employee, FuelStation, Polygon, VehicleProfile};
use crate::service::RecordError;
use waybill_types::{Error, GatewayError, YearMonth};

/// Everything the backend holds for one vehicle and month
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadedMonth {
    pub records: Vec<DayRecord>,
    /// Days confirmed saved server-side
    pub saved_days: BTreeSet<u32>,
    #[serde(default)]
    pub seeds: Option<MonthSeeds>,
    #[serde(default)]
    pub weather_enabled: Option<bool>,
}

/// Body of an incremental save: the day plus the night shift that follows it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayPayload {
    pub record: DayRecord,
    #[serde(default)]
    pub night_shift: Option<DayRecord>,
    /// Month seeds, sent with day 1 only
    #[serde(default)]
    pub seeds: Option<MonthSeeds>,
    #[serde(default)]
    pub weather_enabled: bool,
}

/// Body of a whole-month batch save
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthSnapshot {
    pub seeds: MonthSeeds,
    pub weather_enabled: bool,
    pub records: Vec<DayRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonthSaveResponse {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<RecordError>,
}

/// Backend store for monthly ledgers
///
/// `save_day` must answer with [`GatewayError::Sequence`] when the previous
/// day is not saved yet. `save_month` reports every failing record instead of
/// stopping at the first one.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn load_month(
        &self,
        vehicle_id: &str,
        month: YearMonth,
    ) -> Result<LoadedMonth, GatewayError>;

    async fn save_day(
        &self,
        vehicle_id: &str,
        date: NaiveDate,
        payload: DayPayload,
    ) -> Result<(), GatewayError>;

    async fn save_month(
        &self,
        vehicle_id: &str,
        month: YearMonth,
        snapshot: MonthSnapshot,
    ) -> Result<MonthSaveResponse, GatewayError>;
}

/// Read-only fleet master data (vehicles, staff, stations, disposal sites)
pub trait FleetMasterRepository {
    fn find_vehicle(&self, vehicle_id: &str) -> Result<Option<VehicleProfile>, Error>;

    fn vehicles(&self) -> Result<Vec<VehicleProfile>, Error>;

    fn employees(&self) -> Result<Vec<Employee>, Error>;

    fn fuel_stations(&self) -> Result<Vec<FuelStation>, Error>;

    fn polygons(&self) -> Result<Vec<Polygon>, Error>;
}

/// Ambient temperature per date; `None` means weather unknown
pub trait WeatherSource {
    fn temperature_on(&self, date: NaiveDate) -> Option<f64>;
}

impl WeatherSource for BTreeMap<NaiveDate, f64> {
    fn temperature_on(&self, date: NaiveDate) -> Option<f64> {
        self.get(&date).copied()
    }
}
