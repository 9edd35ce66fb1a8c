//! Configuration management for waybill
//!
//! Config stored at: ~/.config/waybill/config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use waybill_types::{ConfigError, Error, OutputFormat, Result};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory override (ledger files, drafts)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Fleet master TOML (vehicles, employees, fuel stations, polygons)
    #[serde(default)]
    pub master_file: Option<PathBuf>,

    /// `date,temperature` CSV used when weather is switched on
    #[serde(default)]
    pub weather_file: Option<PathBuf>,

    /// Weather adjustment for ledgers that have no stored setting
    #[serde(default)]
    pub weather_enabled: bool,

    /// Quiet period after the last edit before an auto-save runs
    #[serde(default = "default_autosave_delay_secs")]
    pub autosave_delay_secs: u64,

    /// Vehicle used when `--vehicle` is not given
    #[serde(default)]
    pub default_vehicle: Option<String>,

    /// Default output format (json, table)
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
}

fn default_autosave_delay_secs() -> u64 {
    5
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Table
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            master_file: None,
            weather_file: None,
            weather_enabled: false,
            autosave_delay_secs: default_autosave_delay_secs(),
            default_vehicle: None,
            output_format: default_output_format(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NotFound)?
            .join("waybill");
        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }

        let data_dir = dirs::data_dir()
            .ok_or(ConfigError::NotFound)?
            .join("waybill");
        Ok(data_dir)
    }

    /// Directory of the draft store
    pub fn drafts_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("drafts"))
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_secs(self.autosave_delay_secs)
    }

    /// Load config from file, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::SaveError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveError(e.to_string()))?;
        Ok(())
    }

    /// Set one value by key, as typed on the command line.
    ///
    /// An empty value clears optional paths.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let optional_path = |v: &str| (!v.is_empty()).then(|| PathBuf::from(v));
        match key {
            "data_dir" => self.data_dir = optional_path(value),
            "master_file" => self.master_file = optional_path(value),
            "weather_file" => self.weather_file = optional_path(value),
            "default_vehicle" => {
                self.default_vehicle = (!value.is_empty()).then(|| value.to_string())
            }
            "weather_enabled" => {
                self.weather_enabled = match value {
                    "true" | "on" | "yes" => true,
                    "false" | "off" | "no" => false,
                    _ => return Err(invalid(key, value)),
                }
            }
            "autosave_delay_secs" => {
                self.autosave_delay_secs = value.parse().map_err(|_| invalid(key, value))?
            }
            "output_format" => {
                self.output_format = match value.to_ascii_lowercase().as_str() {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    _ => return Err(invalid(key, value)),
                }
            }
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "Unknown config key '{}'",
                    key
                )))
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> Error {
    Error::InvalidArgument(format!("Invalid value '{}' for {}", value, key))
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Waybill Configuration")?;
        writeln!(f, "=====================")?;
        writeln!(f)?;
        writeln!(
            f,
            "Data dir:         {}",
            self.data_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "(error)".to_string())
        )?;
        writeln!(f, "Master file:      {}", display_path(&self.master_file))?;
        writeln!(f, "Weather file:     {}", display_path(&self.weather_file))?;
        writeln!(f, "Weather enabled:  {}", self.weather_enabled)?;
        writeln!(f, "Auto-save delay:  {}s", self.autosave_delay_secs)?;
        writeln!(
            f,
            "Default vehicle:  {}",
            self.default_vehicle.as_deref().unwrap_or("(not set)")
        )?;
        writeln!(f, "Output format:    {}", self.output_format)?;

        if let Ok(path) = Self::config_path() {
            writeln!(f)?;
            writeln!(f, "Config file:      {}", path.display())?;
        }

        Ok(())
    }
}
