//! File-based implementation of PersistenceGateway
//!
//! Layout: `<data_dir>/ledger/<vehicle>/<YYYY-MM>.json`, one `StoredMonth`
//! document per file. The vehicle directory is the id run through
//! [`file_safe_id`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tokio::sync::Mutex;
use waybill_domain::repository::{
    DayPayload, LoadedMonth, MonthSaveResponse, MonthSnapshot, PersistenceGateway,
};
use waybill_types::{file_safe_id, GatewayError, YearMonth};

use super::stored_month::StoredMonth;

pub struct FileLedgerGateway {
    root: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileLedgerGateway {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("ledger"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn month_path(&self, vehicle_id: &str, month: YearMonth) -> PathBuf {
        self.root
            .join(file_safe_id(vehicle_id))
            .join(format!("{}.json", month))
    }

    async fn read(&self, path: &Path) -> Result<StoredMonth, GatewayError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                GatewayError::Transport(format!("corrupt ledger file {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredMonth::default()),
            Err(e) => Err(transport(path, e)),
        }
    }

    async fn write(&self, path: &Path, month: &StoredMonth) -> Result<(), GatewayError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| transport(parent, e))?;
        }
        let bytes = serde_json::to_vec_pretty(month)
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        // Replace atomically
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| transport(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| transport(path, e))
    }
}

fn transport(path: &Path, e: std::io::Error) -> GatewayError {
    GatewayError::Transport(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl PersistenceGateway for FileLedgerGateway {
    async fn load_month(
        &self,
        vehicle_id: &str,
        month: YearMonth,
    ) -> Result<LoadedMonth, GatewayError> {
        let path = self.month_path(vehicle_id, month);
        let stored = self.read(&path).await?;
        log::debug!(
            "Loaded {} record(s) for {} {} from {}",
            stored.records.len(),
            vehicle_id,
            month,
            path.display()
        );
        Ok(stored.to_loaded())
    }

    async fn save_day(
        &self,
        vehicle_id: &str,
        date: NaiveDate,
        payload: DayPayload,
    ) -> Result<(), GatewayError> {
        let _guard = self.write_lock.lock().await;
        let path = self.month_path(vehicle_id, YearMonth::from_date(date));
        let mut stored = self.read(&path).await?;
        stored.apply_day(date.day(), payload)?;
        self.write(&path, &stored).await
    }

    async fn save_month(
        &self,
        vehicle_id: &str,
        month: YearMonth,
        snapshot: MonthSnapshot,
    ) -> Result<MonthSaveResponse, GatewayError> {
        let _guard = self.write_lock.lock().await;
        let path = self.month_path(vehicle_id, month);
        let mut stored = self.read(&path).await?;
        let response = stored.apply_month(snapshot);
        if response.success {
            self.write(&path, &stored).await?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::super::stored_month::test_support::payload;
    use super::*;
    use tempfile::tempdir;

    fn march() -> YearMonth {
        YearMonth::new(2024, 3).unwrap()
    }

    #[tokio::test]
    async fn test_missing_month_loads_empty() {
        let dir = tempdir().unwrap();
        let gateway = FileLedgerGateway::new(dir.path());
        let loaded = gateway.load_month("01A123BC", march()).await.unwrap();
        assert!(loaded.records.is_empty());
        assert!(loaded.saved_days.is_empty());
        assert!(loaded.seeds.is_none());
    }

    #[tokio::test]
    async fn test_saved_days_survive_new_instance() {
        let dir = tempdir().unwrap();
        {
            let gateway = FileLedgerGateway::new(dir.path());
            let date = march().date(1).unwrap();
            gateway.save_day("01A123BC", date, payload(1, 1000, 10)).await.unwrap();
        }
        let gateway = FileLedgerGateway::new(dir.path());
        let loaded = gateway.load_month("01A123BC", march()).await.unwrap();
        assert!(loaded.saved_days.contains(&1));
        assert_eq!(loaded.records[0].odometer_end, Some(1010));
        assert!(dir
            .path()
            .join("ledger")
            .join("01A123BC")
            .join("2024-03.json")
            .exists());
    }

    #[tokio::test]
    async fn test_sequence_error_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let gateway = FileLedgerGateway::new(dir.path());
        let date = march().date(2).unwrap();
        let err = gateway
            .save_day("01A123BC", date, payload(2, 1000, 10))
            .await
            .unwrap_err();
        assert!(err.is_sequence());
        assert!(!gateway.month_path("01A123BC", march()).exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_transport_error() {
        let dir = tempdir().unwrap();
        let gateway = FileLedgerGateway::new(dir.path());
        let path = gateway.month_path("X", march());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        let err = gateway.load_month("X", march()).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_similar_vehicle_ids_use_separate_files() {
        let dir = tempdir().unwrap();
        let gateway = FileLedgerGateway::new(dir.path());
        let date = march().date(1).unwrap();
        gateway.save_day("01A 123", date, payload(1, 777, 10)).await.unwrap();

        let other = gateway.load_month("01A_123", march()).await.unwrap();
        assert!(other.records.is_empty());
        assert!(other.seeds.is_none());
        assert!(other.saved_days.is_empty());

        let own = gateway.load_month("01A 123", march()).await.unwrap();
        assert!(own.saved_days.contains(&1));
        assert_ne!(
            gateway.month_path("01A 123", march()),
            gateway.month_path("01A_123", march())
        );
    }
}
