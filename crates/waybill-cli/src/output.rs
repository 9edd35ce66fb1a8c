//! Output formatting module

use serde::Serialize;
use waybill_domain::ledger::{CascadeOutcome, MonthLedger, MonthSeeds, SpliceOutcome};
use waybill_domain::model::{DayRecord, Employee, FuelStation, Polygon, VehicleProfile};
use waybill_domain::service::RecordError;
use waybill_store::DraftEntry;
use waybill_types::{OutputFormat, Result, YearMonth};

#[derive(Serialize)]
struct LedgerView<'a> {
    vehicle_id: &'a str,
    month: YearMonth,
    seeds: MonthSeeds,
    weather_enabled: bool,
    records: Vec<&'a DayRecord>,
}

#[derive(Serialize)]
pub struct MasterView {
    pub vehicles: Vec<VehicleProfile>,
    pub employees: Vec<Employee>,
    pub fuel_stations: Vec<FuelStation>,
    pub polygons: Vec<Polygon>,
}

fn opt_u64(v: Option<u64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}

fn opt_f64(v: Option<f64>) -> String {
    v.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "?".to_string())
}

fn record_row(record: &DayRecord) -> String {
    let mut flags = String::new();
    if record.dirty {
        flags.push('*');
    }
    if record.provisional {
        flags.push('~');
    }
    if record.validation_errors.iter().any(|i| i.is_blocking()) {
        flags.push('!');
    }

    format!(
        "{:>4} {:>9} {:>5} {:>9} {:>5} {:>7.1} {:>8} {:>6.1} {:>6.1} {:>8} {:>6} {:<8} {:<9} {}",
        record.key().to_string(),
        opt_u64(record.odometer_start),
        record.distance_km,
        opt_u64(record.odometer_end),
        record.trip_count,
        record.waste_volume,
        opt_f64(record.fuel_remaining_start),
        record.fuel_taken,
        record.fuel_norm,
        opt_f64(record.fuel_remaining_end),
        record
            .ambient_temperature
            .map(|t| format!("{:.0}", t))
            .unwrap_or_default(),
        record.driver_id.as_deref().unwrap_or("-"),
        record.save_state.label(),
        flags
    )
}

fn header() -> String {
    format!(
        "{:>4} {:>9} {:>5} {:>9} {:>5} {:>7} {:>8} {:>6} {:>6} {:>8} {:>6} {:<8} {:<9}",
        "Day", "Odo start", "km", "Odo end", "Trips", "Waste", "Fuel in", "Taken", "Norm",
        "Fuel out", "Temp", "Driver", "State"
    )
}

pub fn print_ledger(format: OutputFormat, ledger: &MonthLedger) -> Result<()> {
    if format == OutputFormat::Json {
        let view = LedgerView {
            vehicle_id: ledger.vehicle_id(),
            month: ledger.month(),
            seeds: ledger.seeds(),
            weather_enabled: ledger.weather_enabled(),
            records: ledger.records(),
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let seeds = ledger.seeds();
    println!("\nLedger {} / {}", ledger.vehicle_id(), ledger.month());
    println!("===========================");
    println!(
        "Seeds: odometer {} km, fuel {:.1} L | weather adjustment {}",
        seeds.odometer,
        seeds.fuel,
        if ledger.weather_enabled() { "on" } else { "off" }
    );
    println!();
    println!("{}", header());
    for record in ledger.records() {
        println!("{}", record_row(record));
    }
    if let Some(closing) = ledger.closing_values() {
        println!();
        println!(
            "Closing: odometer {} km, fuel {:.1} L",
            closing.odometer, closing.fuel
        );
    }
    println!("(* unsaved change, ~ start unknown, ! blocking issue)");
    Ok(())
}

/// Print one record with its validation issues
pub fn print_record(format: OutputFormat, record: &DayRecord) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }
    println!("{}", header());
    println!("{}", record_row(record));
    for issue in &record.validation_errors {
        let kind = if issue.is_blocking() { "error" } else { "warning" };
        println!("  {}: {}", kind, issue);
    }
    Ok(())
}

pub fn print_outcome(outcome: &CascadeOutcome) {
    for issue in &outcome.rejected {
        println!("Not applied: {}", issue);
    }
    if outcome.changed.is_empty() {
        println!("No values changed");
        return;
    }
    let keys: Vec<String> = outcome.changed.iter().map(|k| k.to_string()).collect();
    println!("Recalculated {} record(s): {}", keys.len(), keys.join(", "));
}

pub fn print_splice(outcome: &SpliceOutcome) {
    match outcome.notice() {
        Some(notice) => println!("{}", notice),
        None => {
            let verb = match outcome {
                SpliceOutcome::Inserted { .. } => "inserted",
                _ => "removed",
            };
            println!(
                "Night shift {}; {} record(s) affected",
                verb,
                outcome.changed().len()
            );
        }
    }
}

pub fn print_record_errors(errors: &[RecordError]) {
    println!("{} record(s) failed validation:", errors.len());
    for error in errors {
        println!("  {}", error);
    }
}

pub fn print_master(format: OutputFormat, master: &MasterView) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(master)?);
        return Ok(());
    }

    println!("\nVehicles ({})", master.vehicles.len());
    println!("{:<12} {:>8} {:>10} {:>10} {:<8}", "Id", "m³", "L/100km", "L/trip", "Fuel");
    for v in &master.vehicles {
        println!(
            "{:<12} {:>8.1} {:>10.1} {:>10.1} {:<8}",
            v.vehicle_id,
            v.capacity_m3,
            v.fuel_consumption_per_100km,
            v.trip_fuel_consumption,
            v.fuel_type.as_deref().unwrap_or("-")
        );
    }

    println!("\nEmployees ({})", master.employees.len());
    for e in &master.employees {
        println!("  {:<10} {:<8} {}", e.id, format!("{:?}", e.role), e.name);
    }

    println!("\nFuel stations ({})", master.fuel_stations.len());
    for s in &master.fuel_stations {
        println!("  {:<10} {}", s.id, s.name);
    }

    println!("\nPolygons ({})", master.polygons.len());
    for p in &master.polygons {
        println!("  {:<10} {}", p.id, p.name);
    }
    Ok(())
}

pub fn print_drafts(format: OutputFormat, entries: &[&DraftEntry]) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No unsaved drafts");
        return Ok(());
    }
    println!("{:<16} {:<8} {}", "Vehicle", "Month", "Updated");
    for entry in entries {
        println!("{}", draft_line(entry));
    }
    Ok(())
}

fn draft_line(entry: &DraftEntry) -> String {
    format!(
        "{:<16} {:<8} {}",
        entry.vehicle_id,
        entry.month.to_string(),
        entry.updated_at.format("%Y-%m-%d %H:%M")
    )
}
