//! Error types for the waybill ledger

use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration not found")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

/// Errors reported by the persistence gateway
///
/// `Sequence` is kept apart from the generic failures so callers can explain
/// an out-of-order commit instead of showing a bare failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("Day {day} cannot be saved before day {missing} is saved")]
    Sequence { day: u32, missing: u32 },

    #[error("Save rejected: {0}")]
    Rejected(String),

    #[error("Persistence unavailable: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn is_sequence(&self) -> bool {
        matches!(self, GatewayError::Sequence { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Master data error: {0}")]
    MasterData(String),

    #[error("Weather data error: {0}")]
    Weather(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
