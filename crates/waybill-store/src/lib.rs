//! Persistent store for ledger working copies (drafts)
//!
//! Edits live in memory until they are committed to the backend. Between CLI
//! invocations the working copy of each (vehicle, month) is kept here as a
//! JSON document, next to an index of what is stored.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use waybill_types::{file_safe_id, Result, YearMonth};

/// Index entry for one stored draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftEntry {
    pub vehicle_id: String,
    pub month: YearMonth,
    /// File name relative to the store directory
    pub file: String,
    pub updated_at: DateTime<Utc>,
}

/// Draft store keyed by vehicle and month
pub struct DraftStore {
    store_dir: PathBuf,
    index_path: PathBuf,
    entries: BTreeMap<String, DraftEntry>,
}

impl DraftStore {
    /// Create or load a store
    pub fn open(store_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&store_dir)?;
        let index_path = store_dir.join("drafts.json");

        let entries = if index_path.exists() {
            let file = File::open(&index_path)?;
            let reader = BufReader::new(file);
            serde_json::from_reader(reader).unwrap_or_else(|e| {
                log::warn!("Draft index unreadable, starting empty: {}", e);
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            store_dir,
            index_path,
            entries,
        })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn key(vehicle_id: &str, month: YearMonth) -> String {
        format!("{}/{}", vehicle_id, month)
    }

    fn file_name(vehicle_id: &str, month: YearMonth) -> String {
        format!("draft_{}_{}.json", file_safe_id(vehicle_id), month)
    }

    /// Save index to disk
    fn save_index(&self) -> Result<()> {
        let file = File::create(&self.index_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.entries)?;
        Ok(())
    }

    /// Write (or overwrite) the draft for a vehicle and month
    pub fn save<T: Serialize>(&mut self, vehicle_id: &str, month: YearMonth, draft: &T) -> Result<()> {
        let file_name = Self::file_name(vehicle_id, month);
        let path = self.store_dir.join(&file_name);
        let file = File::create(&path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, draft)?;

        self.entries.insert(
            Self::key(vehicle_id, month),
            DraftEntry {
                vehicle_id: vehicle_id.to_string(),
                month,
                file: file_name,
                updated_at: Utc::now(),
            },
        );
        self.save_index()?;
        log::debug!("Draft saved for {} {}", vehicle_id, month);
        Ok(())
    }

    /// Load the draft for a vehicle and month, if one exists
    pub fn load<T: DeserializeOwned>(&self, vehicle_id: &str, month: YearMonth) -> Result<Option<T>> {
        let Some(entry) = self.entries.get(&Self::key(vehicle_id, month)) else {
            return Ok(None);
        };
        let path = self.store_dir.join(&entry.file);
        if !path.exists() {
            log::warn!("Draft file {} missing", path.display());
            return Ok(None);
        }
        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Drop the draft once its content is committed
    pub fn discard(&mut self, vehicle_id: &str, month: YearMonth) -> Result<bool> {
        let Some(entry) = self.entries.remove(&Self::key(vehicle_id, month)) else {
            return Ok(false);
        };
        let path = self.store_dir.join(&entry.file);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        self.save_index()?;
        Ok(true)
    }

    /// All drafts, most recently updated first
    pub fn all_entries(&self) -> Vec<&DraftEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}
