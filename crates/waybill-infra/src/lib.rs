//! Infrastructure layer
//!
//! Concrete implementations of the domain repository traits: the persistence
//! gateways, the fleet master data loader and the weather CSV source.

pub mod fleet_master_loader;
pub mod persistence;
pub mod weather_csv;

pub use fleet_master_loader::FleetMasterLoader;
pub use weather_csv::CsvWeatherSource;
