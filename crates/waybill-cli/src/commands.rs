//! Command handlers

use std::io::Write;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use waybill_app::app::{AutoSaveEvent, AutoSaver, LedgerDraft, LedgerSession, SessionError};
use waybill_app::config::Config;
use waybill_app::repository::{
    open_draft_store, open_fleet_master_repo, open_gateway, open_weather_source, resolve_vehicle,
};
use waybill_domain::ledger::{CommitError, MonthSeeds};
use waybill_domain::model::FieldEdit;
use waybill_domain::repository::{FleetMasterRepository, WeatherSource};
use waybill_store::DraftStore;
use waybill_types::{Error, OutputFormat, RecordKey, Result, YearMonth};

use crate::cli::{Cli, Commands, NightAction, Toggle};
use crate::edits::{parse_session_line, SessionLine, SESSION_HELP};
use crate::output::{self, MasterView};

/// Open session plus the draft store backing it
struct LedgerContext {
    session: LedgerSession,
    drafts: DraftStore,
    /// Drafts are read but never written in dry-run mode
    write_drafts: bool,
}

impl LedgerContext {
    async fn open(cli: &Cli, config: &Config) -> Result<Self> {
        let vehicle_id = cli
            .vehicle
            .clone()
            .or_else(|| config.default_vehicle.clone())
            .ok_or_else(|| {
                Error::InvalidArgument(
                    "No vehicle given. Use --vehicle or: waybill config --set default_vehicle=<id>"
                        .to_string(),
                )
            })?;
        let month = cli
            .month
            .unwrap_or_else(|| YearMonth::from_date(Local::now().date_naive()));

        let vehicle = resolve_vehicle(config, &vehicle_id)?;
        let gateway = open_gateway(config, &vehicle_id, month, cli.dry_run).await?;
        let drafts = open_draft_store(config)?;
        let draft: Option<LedgerDraft> = drafts.load(&vehicle_id, month)?;
        if draft.is_some() {
            log::info!("Resuming draft for {} {}", vehicle_id, month);
        }

        let session =
            LedgerSession::open(gateway, vehicle, month, config.weather_enabled, draft).await?;
        Ok(Self {
            session,
            drafts,
            write_drafts: !cli.dry_run,
        })
    }

    fn persist(&mut self) -> Result<()> {
        if self.write_drafts {
            self.session.persist_draft(&mut self.drafts)?;
        }
        Ok(())
    }
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let format = cli.format.unwrap_or(config.output_format);

    match &cli.command {
        Commands::Config { show, set, reset } => return cmd_config(*show, set, *reset),
        Commands::Master => return cmd_master(&config, format),
        Commands::Drafts => return cmd_drafts(&config, format),
        _ => {}
    }

    let mut ctx = LedgerContext::open(&cli, &config).await?;
    let result = match &cli.command {
        Commands::Show => output::print_ledger(format, &ctx.session.snapshot()),

        Commands::Set {
            day,
            night,
            distance,
            odometer_end,
            trips,
            fuel_taken,
            temperature,
            driver,
            loaders,
            trip_number,
            waste_volume,
        } => {
            let key = if *night {
                RecordKey::night(*day)
            } else {
                RecordKey::day(*day)
            };
            let mut edits = Vec::new();
            if let Some(km) = distance {
                edits.push(FieldEdit::Distance(*km));
            }
            if let Some(end) = odometer_end {
                edits.push(FieldEdit::OdometerEnd(*end));
            }
            if let Some(trips) = trips {
                edits.push(FieldEdit::TripCount(*trips));
            }
            if let Some(litres) = fuel_taken {
                edits.push(FieldEdit::FuelTaken(*litres));
            }
            if let Some(t) = temperature {
                edits.push(FieldEdit::AmbientTemperature(Some(*t)));
            }
            if let Some(volume) = waste_volume {
                edits.push(FieldEdit::WasteVolumeManual(Some(*volume)));
            }
            if let Some(driver) = driver {
                edits.push(FieldEdit::Driver(Some(driver.clone())));
            }
            if let Some(loaders) = loaders {
                edits.push(FieldEdit::Loaders(loaders.clone()));
            }
            if let Some(number) = trip_number {
                edits.push(FieldEdit::TripNumber(Some(number.clone())));
            }
            cmd_set(&ctx.session, key, edits, format)
        }

        Commands::Seed { odometer, fuel } => {
            let outcome = ctx.session.set_seeds(MonthSeeds {
                odometer: *odometer,
                fuel: *fuel,
            })?;
            output::print_outcome(&outcome);
            Ok(())
        }

        Commands::Night { action } => {
            let outcome = match action {
                NightAction::Add { after_day } => ctx.session.insert_night_shift(*after_day)?,
                NightAction::Remove { after_day } => ctx.session.remove_night_shift(*after_day)?,
            };
            output::print_splice(&outcome);
            Ok(())
        }

        Commands::Weather { state } => cmd_weather(&ctx.session, &config, *state == Toggle::On),

        Commands::SaveDay { day } => match ctx.session.save_day(*day).await {
            Ok(state) => {
                println!("Day {}: {}", day, state.label());
                Ok(())
            }
            Err(e) => Err(report_save_error(e)),
        },

        Commands::SaveMonth => match ctx.session.save_month().await {
            Ok(()) => {
                println!("Month {} saved", ctx.session.month());
                Ok(())
            }
            Err(e) => Err(report_save_error(e)),
        },

        Commands::Session => cmd_session(&mut ctx, &config, format).await,

        Commands::Config { .. } | Commands::Master | Commands::Drafts => Ok(()),
    };

    // Keep the working copy whatever happened to the command
    ctx.persist()?;
    result
}

fn cmd_set(
    session: &LedgerSession,
    key: RecordKey,
    edits: Vec<FieldEdit>,
    format: OutputFormat,
) -> Result<()> {
    if edits.is_empty() {
        return Err(Error::InvalidArgument(
            "Nothing to set; pass at least one field flag".to_string(),
        ));
    }
    let outcome = session.edit_all(key, edits)?;
    output::print_outcome(&outcome);
    if let Some(record) = session.read(|l| l.get(key).cloned()) {
        output::print_record(format, &record)?;
    }
    Ok(())
}

fn cmd_weather(session: &LedgerSession, config: &Config, enabled: bool) -> Result<()> {
    let source = if enabled {
        let source = open_weather_source(config)?;
        if source.is_none() {
            println!("No weather file configured; only temperatures already entered are used");
        }
        source
    } else {
        None
    };
    let outcome = session.set_weather(enabled, source.as_ref().map(|s| s as &dyn WeatherSource))?;
    println!(
        "Weather adjustment {}",
        if enabled { "on" } else { "off" }
    );
    output::print_outcome(&outcome);
    Ok(())
}

/// Print the per-record detail of a failed save and convert the error
fn report_save_error(err: SessionError) -> Error {
    match &err {
        SessionError::Commit(CommitError::BatchValidation(errors)) => {
            output::print_record_errors(errors);
        }
        SessionError::Commit(e) if e.is_sequence() => {
            println!("Days are committed in order; save the earlier days first");
        }
        _ => {}
    }
    err.into()
}

fn print_autosave_event(event: &AutoSaveEvent) {
    match event {
        AutoSaveEvent::Saved => println!("[auto-saved]"),
        AutoSaveEvent::Skipped => {}
        AutoSaveEvent::Failed(reason) => println!("[auto-save failed: {}]", reason),
    }
}

async fn cmd_session(ctx: &mut LedgerContext, config: &Config, format: OutputFormat) -> Result<()> {
    let weather = open_weather_source(config)?;
    let (saver, mut events) = AutoSaver::new(ctx.session.clone(), config.autosave_delay());

    println!(
        "Editing {} {} (auto-save after {}s idle; 'help' for commands)",
        ctx.session.vehicle_id(),
        ctx.session.month(),
        config.autosave_delay_secs
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_session_line(&line) {
                    Ok(SessionLine::Quit) => break,
                    Ok(command) => {
                        let weather = weather.as_ref().map(|w| w as &dyn WeatherSource);
                        if let Err(e) = run_session_command(&saver, command, weather, format).await {
                            eprintln!("Error: {}", e);
                        }
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
                ctx.persist()?;
            }
            Some(event) = events.recv() => {
                println!();
                print_autosave_event(&event);
                ctx.persist()?;
            }
        }
    }

    saver.cancel();
    if ctx.session.has_unsaved_changes() {
        println!("Unsaved changes are kept as a draft");
    }
    Ok(())
}

async fn run_session_command(
    saver: &AutoSaver,
    command: SessionLine,
    weather: Option<&dyn WeatherSource>,
    format: OutputFormat,
) -> Result<()> {
    let session = saver.session();
    match command {
        SessionLine::Show => output::print_ledger(format, &session.snapshot())?,
        SessionLine::Set { key, edits } => {
            let outcome = session.edit_all(key, edits)?;
            output::print_outcome(&outcome);
            saver.schedule();
        }
        SessionLine::Seed { odometer, fuel } => {
            output::print_outcome(&session.set_seeds(MonthSeeds { odometer, fuel })?);
            saver.schedule();
        }
        SessionLine::NightAdd(day) => {
            output::print_splice(&session.insert_night_shift(day)?);
            saver.schedule();
        }
        SessionLine::NightRemove(day) => {
            output::print_splice(&session.remove_night_shift(day)?);
            saver.schedule();
        }
        SessionLine::Weather(enabled) => {
            output::print_outcome(&session.set_weather(enabled, weather)?);
            saver.schedule();
        }
        SessionLine::SaveDay(day) => {
            let state = saver.save_day_now(day).await.map_err(report_save_error)?;
            println!("Day {}: {}", day, state.label());
        }
        SessionLine::SaveMonth => {
            saver.save_month_now().await.map_err(report_save_error)?;
            println!("Month saved");
        }
        SessionLine::Help => println!("{}", SESSION_HELP),
        SessionLine::Quit | SessionLine::Empty => {}
    }
    Ok(())
}

fn cmd_master(config: &Config, format: OutputFormat) -> Result<()> {
    let repo = open_fleet_master_repo(config)?.ok_or_else(|| {
        Error::InvalidArgument(
            "No master file configured. Use: waybill config --set master_file=<path>".to_string(),
        )
    })?;
    let master = MasterView {
        vehicles: repo.vehicles()?,
        employees: repo.employees()?,
        fuel_stations: repo.fuel_stations()?,
        polygons: repo.polygons()?,
    };
    output::print_master(format, &master)
}

fn cmd_drafts(config: &Config, format: OutputFormat) -> Result<()> {
    let drafts = open_draft_store(config)?;
    output::print_drafts(format, &drafts.all_entries())
}

fn cmd_config(show: bool, set: &[String], reset: bool) -> Result<()> {
    if reset {
        let config = Config::default();
        config.save()?;
        println!("Configuration reset to defaults");
        println!("\n{}", config);
        return Ok(());
    }

    let mut config = Config::load()?;
    let modified = !set.is_empty();

    for assignment in set {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            Error::InvalidArgument(format!("Expected KEY=VALUE, got '{}'", assignment))
        })?;
        config.set_value(key.trim(), value.trim())?;
    }

    if modified {
        config.save()?;
        println!("Configuration updated");
    }

    if show || !modified {
        println!("{}", config);
    }

    Ok(())
}
