//! Night shift splicing
//!
//! A night shift sits between day N and day N+1. Splicing it in or out is the
//! only operation that changes which record feeds a day's start values.

use waybill_types::RecordKey;

use super::{LedgerError, MonthLedger};
use crate::model::DayRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceOutcome {
    Inserted { changed: Vec<RecordKey> },
    Removed { changed: Vec<RecordKey> },
    /// A night shift already exists at this boundary; nothing was done
    AlreadyPresent { after_day: u32 },
    /// No night shift at this boundary; nothing was done
    NotPresent { after_day: u32 },
}

impl SpliceOutcome {
    /// User-facing notice for the no-op outcomes
    pub fn notice(&self) -> Option<String> {
        match self {
            SpliceOutcome::AlreadyPresent { after_day } => Some(format!(
                "A night shift after day {} already exists",
                after_day
            )),
            SpliceOutcome::NotPresent { after_day } => {
                Some(format!("There is no night shift after day {}", after_day))
            }
            _ => None,
        }
    }

    pub fn changed(&self) -> &[RecordKey] {
        match self {
            SpliceOutcome::Inserted { changed } | SpliceOutcome::Removed { changed } => changed,
            _ => &[],
        }
    }
}

impl MonthLedger {
    /// Splice an empty night shift record in after `after_day`
    pub fn insert_night_shift(&mut self, after_day: u32) -> Result<SpliceOutcome, LedgerError> {
        let day_key = RecordKey::day(after_day);
        self.check_key(day_key)?;
        if !self.nodes.contains_key(&day_key) {
            return Err(LedgerError::UnknownRecord(day_key));
        }

        let night_key = RecordKey::night(after_day);
        if self.nodes.contains_key(&night_key) {
            log::info!("Night shift after day {} already present", after_day);
            return Ok(SpliceOutcome::AlreadyPresent { after_day });
        }

        let mut night = DayRecord::blank(night_key);
        night.dirty = true;
        self.link(night);

        let mut changed = self.recompute_from(night_key);
        if !changed.contains(&night_key) {
            changed.insert(0, night_key);
        }
        // The day owning the night shift has to be committed again
        if !changed.contains(&day_key) {
            changed.insert(0, day_key);
        }
        self.mark_changed(&changed);
        self.verify_after_mutation()?;

        log::debug!("Inserted night shift after day {}", after_day);
        Ok(SpliceOutcome::Inserted { changed })
    }

    /// Remove the night shift after `after_day`, relinking day `after_day + 1`
    pub fn remove_night_shift(&mut self, after_day: u32) -> Result<SpliceOutcome, LedgerError> {
        let night_key = RecordKey::night(after_day);
        let Some((_, next)) = self.unlink(night_key) else {
            return Ok(SpliceOutcome::NotPresent { after_day });
        };

        let mut changed = match next {
            Some(next) => self.recompute_from(next),
            None => Vec::new(),
        };
        let day_key = RecordKey::day(after_day);
        if self.nodes.contains_key(&day_key) && !changed.contains(&day_key) {
            changed.insert(0, day_key);
        }
        self.mark_changed(&changed);
        self.verify_after_mutation()?;

        log::debug!("Removed night shift after day {}", after_day);
        Ok(SpliceOutcome::Removed { changed })
    }
}
