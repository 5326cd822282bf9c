use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::HistoryError;
use crate::types::{EngineResults, ScanVerdict};

/// A stored verdict. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub scan_date: DateTime<Utc>,
    pub file_name: String,
    pub file_size: u64,
    pub file_hash: String,
    pub file_type: String,
    pub malicious_count: u64,
    pub total_engines: usize,
    pub is_malicious: bool,
    pub scan_results: EngineResults,
}

impl HistoryRecord {
    pub fn from_verdict(verdict: &ScanVerdict, scan_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_date,
            file_name: verdict.file_name().to_string(),
            file_size: verdict.file_size(),
            file_hash: verdict.file_hash().to_string(),
            file_type: verdict.file_type().to_string(),
            malicious_count: verdict.malicious_count(),
            total_engines: verdict.total_engines(),
            is_malicious: verdict.is_malicious(),
            scan_results: verdict.results().clone(),
        }
    }
}

pub trait HistoryStore: Send + Sync {
    /// Stores a verdict stamped with the current time.
    fn record(&self, verdict: &ScanVerdict) -> Result<HistoryRecord, HistoryError>;

    /// Most recent records first, at most `limit` of them.
    fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError>;
}

/// In-memory history, optionally mirrored to a JSON-lines journal so it
/// survives restarts.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
    journal: Option<PathBuf>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or starts) a journal at `path`, loading any records already in
    /// it. Lines that fail to parse are skipped with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut records = Vec::new();
        match fs::File::open(&path) {
            Ok(file) => {
                for (lineno, line) in BufReader::new(file).lines().enumerate() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<HistoryRecord>(&line) {
                        Ok(record) => records.push(record),
                        Err(e) => warn!(
                            path = %path.display(),
                            line = lineno + 1,
                            error = %e,
                            "skipping unreadable history line"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(path = %path.display(), records = records.len(), "history journal opened");
        Ok(Self {
            records: Mutex::new(records),
            journal: Some(path),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append_to_journal(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let Some(path) = &self.journal else {
            return Ok(());
        };
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        Ok(())
    }
}

impl HistoryStore for MemoryHistory {
    fn record(&self, verdict: &ScanVerdict) -> Result<HistoryRecord, HistoryError> {
        let record = HistoryRecord::from_verdict(verdict, Utc::now());
        let mut records = self.lock();
        self.append_to_journal(&record)?;
        records.push(record.clone());
        Ok(record)
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut records = self.lock().clone();
        records.sort_by(|a, b| b.scan_date.cmp(&a.scan_date));
        records.truncate(limit);
        Ok(records)
    }
}
