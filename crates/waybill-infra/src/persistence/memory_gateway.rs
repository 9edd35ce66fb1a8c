//! In-memory implementation of PersistenceGateway
//!
//! Used for `--dry-run` sessions and tests. Transport faults and latency can
//! be injected to exercise the failure and in-flight paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use waybill_domain::repository::{
    DayPayload, LoadedMonth, MonthSaveResponse, MonthSnapshot, PersistenceGateway,
};
use waybill_types::{GatewayError, YearMonth};

use super::stored_month::StoredMonth;

#[derive(Default)]
pub struct InMemoryGateway {
    months: Mutex<HashMap<(String, YearMonth), StoredMonth>>,
    failures_pending: AtomicU32,
    latency: Option<Duration>,
    day_saves: AtomicUsize,
    month_saves: AtomicUsize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches the store
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` calls fail with a transport error
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Pre-populate the backend for a vehicle month
    pub fn insert_month(&self, vehicle_id: &str, month: YearMonth, stored: StoredMonth) {
        self.months()
            .insert((vehicle_id.to_string(), month), stored);
    }

    pub fn stored_month(&self, vehicle_id: &str, month: YearMonth) -> Option<StoredMonth> {
        self.months()
            .get(&(vehicle_id.to_string(), month))
            .cloned()
    }

    /// Number of `save_day` calls received, failed ones included
    pub fn day_save_count(&self) -> usize {
        self.day_saves.load(Ordering::SeqCst)
    }

    pub fn month_save_count(&self) -> usize {
        self.month_saves.load(Ordering::SeqCst)
    }

    fn months(&self) -> MutexGuard<'_, HashMap<(String, YearMonth), StoredMonth>> {
        self.months.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self) -> Result<(), GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(GatewayError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn load_month(
        &self,
        vehicle_id: &str,
        month: YearMonth,
    ) -> Result<LoadedMonth, GatewayError> {
        self.enter().await?;
        Ok(self
            .months()
            .get(&(vehicle_id.to_string(), month))
            .map(StoredMonth::to_loaded)
            .unwrap_or_default())
    }

    async fn save_day(
        &self,
        vehicle_id: &str,
        date: NaiveDate,
        payload: DayPayload,
    ) -> Result<(), GatewayError> {
        self.day_saves.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let mut months = self.months();
        let stored = months
            .entry((vehicle_id.to_string(), YearMonth::from_date(date)))
            .or_default();
        stored.apply_day(date.day(), payload)
    }

    async fn save_month(
        &self,
        vehicle_id: &str,
        month: YearMonth,
        snapshot: MonthSnapshot,
    ) -> Result<MonthSaveResponse, GatewayError> {
        self.month_saves.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let mut months = self.months();
        let stored = months.entry((vehicle_id.to_string(), month)).or_default();
        Ok(stored.apply_month(snapshot))
    }
}
