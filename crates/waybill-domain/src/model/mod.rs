//! Domain model types

pub mod day_record;
pub mod reference;
pub mod vehicle;

pub use day_record::{DayRecord, FieldEdit, FuelFill, WasteDelivery};
pub use reference::{Employee, EmployeeRole, FuelStation, Polygon};
pub use vehicle::VehicleProfile;
