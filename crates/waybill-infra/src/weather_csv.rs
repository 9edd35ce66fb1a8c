//! Ambient temperature history from a `date,temperature` CSV file
//!
//! A header row is optional. Dates may be written `2024-03-05`, `2024/03/05`
//! or `05.03.2024`.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use waybill_domain::repository::WeatherSource;
use waybill_types::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CsvWeatherSource {
    temperatures: BTreeMap<NaiveDate, f64>,
}

impl CsvWeatherSource {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Weather(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Self::load_from_reader(file)
    }

    pub fn load_from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut temperatures = BTreeMap::new();
        for (index, row) in csv_reader.records().enumerate() {
            let row = row.map_err(|e| Error::Weather(format!("Malformed CSV: {}", e)))?;
            let line = row
                .position()
                .map(|p| p.line())
                .unwrap_or(index as u64 + 1);
            if row.iter().all(|f| f.is_empty()) {
                continue;
            }

            let date = row.get(0).and_then(parse_date);
            let temperature = row.get(1).and_then(|t| t.parse::<f64>().ok());
            match (date, temperature) {
                (Some(date), Some(temperature)) if temperature.is_finite() => {
                    temperatures.insert(date, temperature);
                }
                // Header row
                _ if index == 0 => continue,
                _ => {
                    return Err(Error::Weather(format!(
                        "Line {}: expected date,temperature",
                        line
                    )))
                }
            }
        }

        log::debug!("Loaded {} temperature reading(s)", temperatures.len());
        Ok(Self { temperatures })
    }

    pub fn len(&self) -> usize {
        self.temperatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temperatures.is_empty()
    }
}

impl WeatherSource for CsvWeatherSource {
    fn temperature_on(&self, date: NaiveDate) -> Option<f64> {
        self.temperatures.get(&date).copied()
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let formats = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
