//! Domain layer for the monthly vehicle ledger
//!
//! Holds the day-record model, the fuel norm and validation services, the
//! `MonthLedger` engine (chain store, cascade, night shift splicing and the
//! sequential commit workflow) and the repository traits implemented by the
//! infrastructure crate.

pub mod ledger;
pub mod model;
pub mod repository;
pub mod service;

pub use ledger::{
    CascadeOutcome, CommitError, DaySaveTicket, LedgerError, MonthLedger, MonthSaveTicket,
    MonthSeeds, SpliceOutcome,
};
pub use model::*;
