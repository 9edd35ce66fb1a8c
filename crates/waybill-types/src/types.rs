//! Shared value types: calendar month, chain keys and save states

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month (`YYYY-MM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        // Rejects month 0/13 and years chrono cannot represent
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn days_in_month(&self) -> u32 {
        let next = self.next().first_day();
        next.signed_duration_since(self.first_day()).num_days() as u32
    }

    /// Date of `day` within this month, if the day exists
    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (year, month) = s
            .split_once('-')
            .or_else(|| s.split_once('/'))
            .ok_or_else(|| format!("expected YYYY-MM, got '{}'", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in '{}'", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in '{}'", s))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range: '{}'", s))
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Position of a record in the monthly chain
///
/// Ordered by `(day, night)`, so the night shift after day N sorts between
/// day N and day N+1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub day: u32,
    pub night: bool,
}

impl RecordKey {
    pub const fn day(day: u32) -> Self {
        Self { day, night: false }
    }

    pub const fn night(after_day: u32) -> Self {
        Self {
            day: after_day,
            night: true,
        }
    }

    /// The record whose end values feed this record's start values.
    ///
    /// For a plain day this is either the preceding night shift or the
    /// preceding day, so it is returned as a pair of candidates.
    pub fn direct_predecessors(&self) -> [Option<RecordKey>; 2] {
        if self.night {
            [Some(RecordKey::day(self.day)), None]
        } else if self.day <= 1 {
            [None, None]
        } else {
            [
                Some(RecordKey::night(self.day - 1)),
                Some(RecordKey::day(self.day - 1)),
            ]
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.night {
            write!(f, "{}n", self.day)
        } else {
            write!(f, "{}", self.day)
        }
    }
}

impl FromStr for RecordKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, night) = match s.strip_suffix('n') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let day: u32 = digits
            .parse()
            .map_err(|_| format!("invalid record key '{}'", s))?;
        Ok(RecordKey { day, night })
    }
}

/// Commit state of a single day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaveState {
    #[default]
    NotSaved,
    Savable,
    Saved,
}

impl SaveState {
    pub fn label(&self) -> &'static str {
        match self {
            SaveState::NotSaved => "not saved",
            SaveState::Savable => "savable",
            SaveState::Saved => "saved",
        }
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Encode a vehicle id as a single file name component.
///
/// ASCII letters, digits and `-` pass through; every other byte becomes
/// `%XX`. Distinct ids always map to distinct names.
pub fn file_safe_id(vehicle_id: &str) -> String {
    let mut out = String::with_capacity(vehicle_id.len());
    for byte in vehicle_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_month_parse_and_display() {
        let ym: YearMonth = "2024-02".parse().unwrap();
        assert_eq!(ym.year(), 2024);
        assert_eq!(ym.month(), 2);
        assert_eq!(ym.to_string(), "2024-02");
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("march".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(YearMonth::new(2024, 2).unwrap().days_in_month(), 29);
        assert_eq!(YearMonth::new(2023, 2).unwrap().days_in_month(), 28);
        assert_eq!(YearMonth::new(2024, 12).unwrap().days_in_month(), 31);
        assert_eq!(YearMonth::new(2024, 4).unwrap().days_in_month(), 30);
    }

    #[test]
    fn test_previous_wraps_year() {
        let jan = YearMonth::new(2024, 1).unwrap();
        assert_eq!(jan.previous(), YearMonth::new(2023, 12).unwrap());
    }

    #[test]
    fn test_record_key_ordering() {
        let mut keys = vec![RecordKey::day(6), RecordKey::night(5), RecordKey::day(5)];
        keys.sort();
        assert_eq!(
            keys,
            vec![RecordKey::day(5), RecordKey::night(5), RecordKey::day(6)]
        );
    }

    #[test]
    fn test_record_key_parse() {
        assert_eq!("5n".parse::<RecordKey>().unwrap(), RecordKey::night(5));
        assert_eq!("12".parse::<RecordKey>().unwrap(), RecordKey::day(12));
        assert_eq!(RecordKey::night(3).to_string(), "3n");
    }

    #[test]
    fn test_year_month_serde_as_string() {
        let ym = YearMonth::new(2024, 3).unwrap();
        let json = serde_json::to_string(&ym).unwrap();
        assert_eq!(json, "\"2024-03\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ym);
    }

    #[test]
    fn test_file_safe_id_keeps_ids_apart() {
        assert_eq!(file_safe_id("01A123BC"), "01A123BC");
        assert_eq!(file_safe_id("01A 123"), "01A%20123");
        assert_eq!(file_safe_id("01A_123"), "01A%5F123");
        assert_eq!(file_safe_id("T/2"), "T%2F2");
        assert_eq!(file_safe_id("%"), "%25");
        assert_ne!(file_safe_id("01A 123"), file_safe_id("01A_123"));
        assert_ne!(file_safe_id("a%20"), file_safe_id("a "));
    }
}
