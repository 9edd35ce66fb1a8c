//! Waybill - monthly vehicle ledger for waste-collection fleets
//!
//! Keeps the day-by-day odometer and fuel chain of one vehicle consistent
//! while records are edited, and commits days to the backend in order.

mod cli;
mod commands;
mod edits;
mod output;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = commands::execute(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
