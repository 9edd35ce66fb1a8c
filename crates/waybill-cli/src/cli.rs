//! CLI definition using clap

use clap::{Parser, Subcommand, ValueEnum};
use waybill_types::{OutputFormat, YearMonth};

#[derive(Parser)]
#[command(name = "waybill")]
#[command(author = "yuuji")]
#[command(version)]
#[command(about = "Monthly vehicle ledger: odometer and fuel chain, sequential day commits")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vehicle id. Uses the configured default vehicle if not specified.
    #[arg(long, global = true)]
    pub vehicle: Option<String>,

    /// Ledger month (YYYY-MM). Defaults to the current month.
    #[arg(long, short = 'm', global = true)]
    pub month: Option<YearMonth>,

    /// Output format (json, table). Uses config value if not specified.
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Run against an in-memory copy; nothing is written
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum NightAction {
    /// Insert a night shift after a day
    Add { after_day: u32 },
    /// Remove the night shift after a day
    Remove { after_day: u32 },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the ledger
    Show,

    /// Edit one record; the change propagates to later days
    Set {
        /// Day of month
        day: u32,

        /// Edit the night shift after this day instead of the day itself
        #[arg(long)]
        night: bool,

        /// Distance driven (km)
        #[arg(long)]
        distance: Option<u32>,

        /// Odometer reading at the end of the shift (sets the distance)
        #[arg(long)]
        odometer_end: Option<u64>,

        /// Number of disposal trips
        #[arg(long)]
        trips: Option<u32>,

        /// Fuel taken on (litres)
        #[arg(long)]
        fuel_taken: Option<f64>,

        /// Ambient temperature (°C)
        #[arg(long, allow_hyphen_values = true)]
        temperature: Option<f64>,

        /// Driver employee id
        #[arg(long)]
        driver: Option<String>,

        /// Loader employee ids, comma separated
        #[arg(long, value_delimiter = ',')]
        loaders: Option<Vec<String>>,

        /// Waybill / trip number
        #[arg(long)]
        trip_number: Option<String>,

        /// Waste volume (m³), overrides the trips × capacity estimate
        #[arg(long)]
        waste_volume: Option<f64>,
    },

    /// Set the odometer and fuel balance the month starts from
    Seed {
        #[arg(long)]
        odometer: u64,

        #[arg(long)]
        fuel: f64,
    },

    /// Insert or remove a night shift
    Night {
        #[command(subcommand)]
        action: NightAction,
    },

    /// Switch the cold-weather fuel adjustment
    Weather { state: Toggle },

    /// Commit one day (and its night shift)
    SaveDay { day: u32 },

    /// Commit the whole month in one batch
    SaveMonth,

    /// Interactive editing session with auto-save
    Session,

    /// List fleet master data
    Master,

    /// List working copies that still hold uncommitted edits
    Drafts,

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Set a value, e.g. --set master_file=/srv/fleet.toml (repeatable)
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Reset to defaults
        #[arg(long)]
        reset: bool,
    },
}
