//! Application use cases

pub mod autosave;
pub mod ledger_session;

pub use autosave::{AutoSaveEvent, AutoSaver};
pub use ledger_session::{LedgerDraft, LedgerSession, SessionError};
