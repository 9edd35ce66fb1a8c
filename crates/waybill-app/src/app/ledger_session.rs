//! Ledger Session - editing and committing one vehicle month
//!
//! The session owns the in-memory ledger and the gateway it is committed to.
//! Edits are synchronous. Saves run in three steps so the ledger is never
//! locked while the gateway is awaited:
//! 1. `begin_*` checks ordering and validation and snapshots the payload
//! 2. the gateway call runs with the lock released
//! 3. `complete_*` applies the answer, keeping edits made in the meantime

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use waybill_domain::ledger::{
    CascadeOutcome, CommitError, LedgerError, MonthLedger, MonthSeeds, SpliceOutcome,
};
use waybill_domain::model::{DayRecord, FieldEdit, VehicleProfile};
use waybill_domain::repository::{LoadedMonth, PersistenceGateway, WeatherSource};
use waybill_store::DraftStore;
use waybill_types::{GatewayError, RecordKey, SaveState, YearMonth};

/// Errors specific to the ledger session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("Failed to load ledger: {0}")]
    Load(#[from] GatewayError),

    #[error("Draft store error: {0}")]
    Draft(#[from] waybill_types::Error),

    #[error("Draft is for {found}, not {expected}")]
    DraftMismatch { expected: String, found: String },
}

impl From<SessionError> for waybill_types::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Ledger(e) => waybill_types::Error::Ledger(e.to_string()),
            SessionError::Commit(CommitError::Gateway(e)) | SessionError::Load(e) => {
                waybill_types::Error::Gateway(e)
            }
            SessionError::Commit(e) => waybill_types::Error::Commit(e.to_string()),
            SessionError::Draft(e) => e,
            SessionError::DraftMismatch { expected, found } => waybill_types::Error::InvalidArgument(
                format!("Draft is for {}, not {}", found, expected),
            ),
        }
    }
}

/// Unsaved working copy of a ledger, kept between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerDraft {
    pub vehicle_id: String,
    pub month: YearMonth,
    pub seeds: MonthSeeds,
    pub weather_enabled: bool,
    /// Every record in chain order
    pub records: Vec<DayRecord>,
    pub saved_at: DateTime<Utc>,
}

/// Shared handle on one vehicle month; clones refer to the same ledger
#[derive(Clone)]
pub struct LedgerSession {
    ledger: Arc<Mutex<MonthLedger>>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl LedgerSession {
    pub fn new(ledger: MonthLedger, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            gateway,
        }
    }

    /// Load a month from the backend and build its ledger.
    ///
    /// A draft, when given, replaces the backend records as the working copy.
    /// Save states always come from the backend. Without stored seeds the
    /// month starts from the previous month's closing values.
    pub async fn open(
        gateway: Arc<dyn PersistenceGateway>,
        vehicle: VehicleProfile,
        month: YearMonth,
        weather_default: bool,
        draft: Option<LedgerDraft>,
    ) -> Result<Self, SessionError> {
        let loaded = gateway.load_month(&vehicle.vehicle_id, month).await?;
        if let Some(ref draft) = draft {
            if draft.vehicle_id != vehicle.vehicle_id || draft.month != month {
                return Err(SessionError::DraftMismatch {
                    expected: format!("{} {}", vehicle.vehicle_id, month),
                    found: format!("{} {}", draft.vehicle_id, draft.month),
                });
            }
        }

        let seeds = match (&draft, loaded.seeds) {
            (Some(draft), _) => draft.seeds,
            (None, Some(seeds)) => seeds,
            (None, None) => Self::carried_seeds(gateway.as_ref(), &vehicle.vehicle_id, month).await,
        };
        let weather_enabled = match &draft {
            Some(draft) => draft.weather_enabled,
            None => loaded.weather_enabled.unwrap_or(weather_default),
        };

        let LoadedMonth {
            records,
            saved_days,
            ..
        } = loaded;
        let (records, from_draft) = match draft {
            Some(draft) => (draft.records, true),
            None => (records, false),
        };

        let mut ledger = MonthLedger::new(vehicle, month, seeds, weather_enabled);
        ledger.overlay(records)?;
        ledger.reconcile(&saved_days);
        log::info!(
            "Opened {} {} ({} record(s), {} saved day(s){})",
            ledger.vehicle_id(),
            month,
            ledger.len(),
            saved_days.len(),
            if from_draft { ", from draft" } else { "" }
        );

        Ok(Self::new(ledger, gateway))
    }

    /// Closing values of the previous month, or zero when it holds nothing
    async fn carried_seeds(
        gateway: &dyn PersistenceGateway,
        vehicle_id: &str,
        month: YearMonth,
    ) -> MonthSeeds {
        match gateway.load_month(vehicle_id, month.previous()).await {
            Ok(previous) => previous
                .records
                .iter()
                .filter_map(DayRecord::end_values)
                .last()
                .map(|(odometer, fuel)| MonthSeeds { odometer, fuel })
                .unwrap_or_default(),
            Err(e) => {
                log::warn!("Could not load {} for carry-over: {}", month.previous(), e);
                MonthSeeds::default()
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonthLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the current ledger
    pub fn read<R>(&self, f: impl FnOnce(&MonthLedger) -> R) -> R {
        let ledger = self.lock();
        f(&*ledger)
    }

    /// Copy of the current ledger
    pub fn snapshot(&self) -> MonthLedger {
        self.lock().clone()
    }

    pub fn month(&self) -> YearMonth {
        self.lock().month()
    }

    pub fn vehicle_id(&self) -> String {
        self.lock().vehicle_id().to_string()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.lock().has_unsaved_changes()
    }

    pub fn save_state(&self, day: u32) -> Option<SaveState> {
        self.lock().save_state(day)
    }

    pub fn edit(&self, key: RecordKey, edit: FieldEdit) -> Result<CascadeOutcome, SessionError> {
        Ok(self.lock().on_field_changed(key, edit)?)
    }

    /// Apply several edits to one record, stopping at the first error
    pub fn edit_all(
        &self,
        key: RecordKey,
        edits: Vec<FieldEdit>,
    ) -> Result<CascadeOutcome, SessionError> {
        let mut ledger = self.lock();
        let mut combined = CascadeOutcome::default();
        for edit in edits {
            let outcome = ledger.on_field_changed(key, edit)?;
            for changed in outcome.changed {
                if !combined.changed.contains(&changed) {
                    combined.changed.push(changed);
                }
            }
            combined.rejected.extend(outcome.rejected);
        }
        combined.changed.sort();
        Ok(combined)
    }

    pub fn set_seeds(&self, seeds: MonthSeeds) -> Result<CascadeOutcome, SessionError> {
        Ok(self.lock().set_seeds(seeds)?)
    }

    pub fn insert_night_shift(&self, after_day: u32) -> Result<SpliceOutcome, SessionError> {
        Ok(self.lock().insert_night_shift(after_day)?)
    }

    pub fn remove_night_shift(&self, after_day: u32) -> Result<SpliceOutcome, SessionError> {
        Ok(self.lock().remove_night_shift(after_day)?)
    }

    /// Switch the weather adjustment; when switching on, temperatures missing
    /// from the ledger are filled in from `source`
    pub fn set_weather(
        &self,
        enabled: bool,
        source: Option<&dyn WeatherSource>,
    ) -> Result<CascadeOutcome, SessionError> {
        let mut ledger = self.lock();
        let mut outcome = ledger.set_weather_enabled(enabled)?;
        if let (true, Some(source)) = (enabled, source) {
            let filled = ledger.apply_weather(source, false)?;
            for key in filled.changed {
                if !outcome.changed.contains(&key) {
                    outcome.changed.push(key);
                }
            }
            outcome.changed.sort();
        }
        Ok(outcome)
    }

    /// Commit one day (with its night shift) to the backend
    pub async fn save_day(&self, day: u32) -> Result<SaveState, SessionError> {
        let (ticket, vehicle_id) = {
            let mut ledger = self.lock();
            (ledger.begin_save_day(day)?, ledger.vehicle_id().to_string())
        };

        let result = self
            .gateway
            .save_day(&vehicle_id, ticket.date(), ticket.payload().clone())
            .await;

        Ok(self.lock().complete_save_day(ticket, result)?)
    }

    /// Commit the whole month in one batch
    pub async fn save_month(&self) -> Result<(), SessionError> {
        let (ticket, vehicle_id, month) = {
            let mut ledger = self.lock();
            (
                ledger.begin_save_month()?,
                ledger.vehicle_id().to_string(),
                ledger.month(),
            )
        };

        let result = self
            .gateway
            .save_month(&vehicle_id, month, ticket.snapshot().clone())
            .await;

        self.lock().complete_save_month(ticket, result)?;
        Ok(())
    }

    /// Re-read which days the backend holds as saved
    pub async fn refresh_save_states(&self) -> Result<BTreeSet<u32>, SessionError> {
        let (vehicle_id, month) = {
            let ledger = self.lock();
            (ledger.vehicle_id().to_string(), ledger.month())
        };
        let loaded = self.gateway.load_month(&vehicle_id, month).await?;
        self.lock().reconcile(&loaded.saved_days);
        Ok(loaded.saved_days)
    }

    pub fn draft(&self) -> LedgerDraft {
        let ledger = self.lock();
        LedgerDraft {
            vehicle_id: ledger.vehicle_id().to_string(),
            month: ledger.month(),
            seeds: ledger.seeds(),
            weather_enabled: ledger.weather_enabled(),
            records: ledger.records().into_iter().cloned().collect(),
            saved_at: Utc::now(),
        }
    }

    /// Store the working copy, or drop it once everything is committed
    pub fn persist_draft(&self, store: &mut DraftStore) -> Result<(), SessionError> {
        let draft = self.draft();
        if self.has_unsaved_changes() {
            store.save(&draft.vehicle_id, draft.month, &draft)?;
        } else if store.discard(&draft.vehicle_id, draft.month)? {
            log::debug!("Draft for {} {} discarded", draft.vehicle_id, draft.month);
        }
        Ok(())
    }
}
