//! Persistence implementations
//!
//! File-backed and in-memory implementations of `PersistenceGateway`, both
//! enforcing the same backend rules (see `stored_month`), plus the
//! file-backed fleet master repository.

mod file_fleet_master_repo;
mod file_ledger_gateway;
mod memory_gateway;
mod stored_month;

pub use file_fleet_master_repo::FileFleetMasterRepository;
pub use file_ledger_gateway::FileLedgerGateway;
pub use memory_gateway::InMemoryGateway;
pub use stored_month::StoredMonth;
