//! Parsing of `field=value` edits and interactive session lines

use waybill_domain::model::FieldEdit;
use waybill_types::{Error, RecordKey, Result};

/// One parsed line of the interactive session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLine {
    Show,
    Set { key: RecordKey, edits: Vec<FieldEdit> },
    Seed { odometer: u64, fuel: f64 },
    NightAdd(u32),
    NightRemove(u32),
    Weather(bool),
    SaveDay(u32),
    SaveMonth,
    Help,
    Quit,
    Empty,
}

pub const SESSION_HELP: &str = "\
Commands:
  show
  set <day>[n] field=value ...   fields: distance odometer_end trips fuel_taken
                                 temperature driver loaders trip_number waste_volume
                                 (value '-' clears optional fields)
  seed <odometer> <fuel>
  night add|remove <day>
  weather on|off
  save-day <day>
  save-month
  quit";

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidArgument(msg.into())
}

fn number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a valid {}", value, field)))
}

fn optional_text(value: &str) -> Option<String> {
    (value != "-" && !value.is_empty()).then(|| value.to_string())
}

/// Parse a single `field=value` pair
pub fn parse_field_edit(field: &str, value: &str) -> Result<FieldEdit> {
    let edit = match field {
        "distance" | "km" => FieldEdit::Distance(number(field, value)?),
        "odometer_end" | "odometer" => FieldEdit::OdometerEnd(number(field, value)?),
        "trips" => FieldEdit::TripCount(number(field, value)?),
        "fuel_taken" | "fuel" => FieldEdit::FuelTaken(number(field, value)?),
        "temperature" | "temp" => FieldEdit::AmbientTemperature(match value {
            "-" => None,
            v => Some(number(field, v)?),
        }),
        "waste_volume" => FieldEdit::WasteVolumeManual(match value {
            "-" => None,
            v => Some(number(field, v)?),
        }),
        "driver" => FieldEdit::Driver(optional_text(value)),
        "trip_number" => FieldEdit::TripNumber(optional_text(value)),
        "loaders" => FieldEdit::Loaders(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "-")
                .map(str::to_string)
                .collect(),
        ),
        _ => return Err(invalid(format!("Unknown field '{}'", field))),
    };
    Ok(edit)
}

pub fn parse_session_line(line: &str) -> Result<SessionLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = tokens.split_first() else {
        return Ok(SessionLine::Empty);
    };

    let day_arg = |args: &[&str]| -> Result<u32> {
        let raw = args.first().ok_or_else(|| invalid("Missing day"))?;
        number("day", raw)
    };

    match command {
        "show" | "ls" => Ok(SessionLine::Show),
        "set" => {
            let raw_key = args.first().ok_or_else(|| invalid("Missing record, e.g. set 5 distance=120"))?;
            let key: RecordKey = raw_key.parse().map_err(|e: String| invalid(e))?;
            let edits = args[1..]
                .iter()
                .map(|pair| {
                    let (field, value) = pair
                        .split_once('=')
                        .ok_or_else(|| invalid(format!("Expected field=value, got '{}'", pair)))?;
                    parse_field_edit(field, value)
                })
                .collect::<Result<Vec<_>>>()?;
            if edits.is_empty() {
                return Err(invalid("Nothing to set"));
            }
            Ok(SessionLine::Set { key, edits })
        }
        "seed" => match args {
            [odometer, fuel] => Ok(SessionLine::Seed {
                odometer: number("odometer", odometer)?,
                fuel: number("fuel", fuel)?,
            }),
            _ => Err(invalid("Usage: seed <odometer> <fuel>")),
        },
        "night" => match args {
            ["add", day] => Ok(SessionLine::NightAdd(number("day", day)?)),
            ["remove", day] => Ok(SessionLine::NightRemove(number("day", day)?)),
            _ => Err(invalid("Usage: night add|remove <day>")),
        },
        "weather" => match args {
            ["on"] => Ok(SessionLine::Weather(true)),
            ["off"] => Ok(SessionLine::Weather(false)),
            _ => Err(invalid("Usage: weather on|off")),
        },
        "save-day" => Ok(SessionLine::SaveDay(day_arg(args)?)),
        "save-month" => Ok(SessionLine::SaveMonth),
        "help" | "?" => Ok(SessionLine::Help),
        "quit" | "exit" | "q" => Ok(SessionLine::Quit),
        other => Err(invalid(format!("Unknown command '{}' (try 'help')", other))),
    }
}
