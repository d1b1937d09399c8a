//! Analysis storage for defectscan
//!
//! Persists the engine's output, one JSON document per analysis:
//!
//! ```text
//! <store dir>/
//!   ├── 6f1c…e2.json   AnalysisRecord { id, created_at, metadata, summary, findings }
//!   └── 93ab…07.json
//! ```
//!
//! - **Atomic**: records are written to a temp file in the store directory and
//!   renamed into place
//! - **Duplicate detection**: each record carries the SHA-256 of its source file
//! - **Statistics**: [`StoreStats`] aggregates totals across the store
//! - **Read-only findings**: records are never rewritten, only deleted whole

use chrono::{DateTime, Utc};
use defectscan_core::{AnalysisSummary, Finding};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;


/// Identifier returned by [`AnalysisStore::store`]
pub type AnalysisId = Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt analysis record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize analysis: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("analysis {0} not found")]
    NotFound(AnalysisId),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ============================================================================
// Records
// ============================================================================

/// Caller-supplied facts about the analysed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub filename: String,
    /// SHA-256 of the source file, lower-case hex.
    pub file_hash: Option<String>,
    /// Length of the classified text in chars.
    pub text_chars: usize,
    pub processing_method: String,
}

/// A stored analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: AnalysisId,
    pub created_at: DateTime<Utc>,
    pub metadata: AnalysisMetadata,
    pub summary: AnalysisSummary,
    pub findings: Vec<Finding>,
}

// ============================================================================
// Store
// ============================================================================

/// Directory of JSON analysis records
pub struct AnalysisStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl AnalysisStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: AnalysisId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Persist `findings` with `metadata`; returns the new analysis id.
    pub fn store(
        &self,
        findings: &[Finding],
        metadata: AnalysisMetadata,
    ) -> Result<AnalysisId, StorageError> {
        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            summary: AnalysisSummary::from_findings(findings),
            metadata,
            findings: findings.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        let path = self.record_path(record.id);

        let _guard = self.write_lock.lock();
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err(&self.dir))?;
        tmp.write_all(&json).map_err(io_err(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_err(tmp.path()))?;
        tmp.persist(&path)
            .map_err(|e| StorageError::Io {
                path: path.clone(),
                source: e.error,
            })?;

        info!(
            id = %record.id,
            filename = %record.metadata.filename,
            findings = record.findings.len(),
            "analysis stored"
        );
        Ok(record.id)
    }

    pub fn load(&self, id: AnalysisId) -> Result<AnalysisRecord, StorageError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StorageError::NotFound(id));
        }
        read_record(&path)
    }

    /// All records, newest first. Unreadable files are logged and skipped.
    pub fn list(&self) -> Result<Vec<AnalysisRecord>, StorageError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let path = entry.map_err(io_err(&self.dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable record"),
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(count = records.len(), "listed analyses");
        Ok(records)
    }

    /// Remove a stored analysis, returning what was removed.
    pub fn delete(&self, id: AnalysisId) -> Result<AnalysisRecord, StorageError> {
        let path = self.record_path(id);
        let _guard = self.write_lock.lock();
        if !path.exists() {
            return Err(StorageError::NotFound(id));
        }
        let record = read_record(&path)?;
        fs::remove_file(&path).map_err(io_err(&path))?;
        info!(
            id = %id,
            filename = %record.metadata.filename,
            findings = record.findings.len(),
            "analysis deleted"
        );
        Ok(record)
    }

    /// Aggregate statistics over every readable record.
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        Ok(StoreStats::from_records(&self.list()?))
    }

    /// Most recent analysis of a file with this hash, if any.
    pub fn find_by_hash(&self, hash: &str) -> Result<Option<AnalysisRecord>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|r| r.metadata.file_hash.as_deref() == Some(hash)))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Store-wide counts, as shown on a dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_analyses: usize,
    pub total_findings: usize,
    /// Analyses per processing method (`rule_based` / `hybrid`).
    pub by_processing_method: BTreeMap<String, usize>,
    /// Findings per defect category, across all analyses.
    pub by_category: BTreeMap<String, usize>,
    /// Mean of the per-analysis mean confidence, per processing method.
    /// Analyses without findings are left out.
    pub mean_confidence_by_method: BTreeMap<String, f64>,
    pub latest: Option<DateTime<Utc>>,
}

impl StoreStats {
    pub fn from_records(records: &[AnalysisRecord]) -> Self {
        let mut by_processing_method = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut confidence_sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();

        for r in records {
            let method = r.summary.processing_method.clone();
            *by_processing_method.entry(method.clone()).or_insert(0) += 1;
            for (category, count) in &r.summary.by_category {
                *by_category.entry(category.clone()).or_insert(0) += count;
            }
            if let Some(mean) = r.summary.mean_confidence {
                let slot = confidence_sums.entry(method).or_insert((0.0, 0));
                slot.0 += mean;
                slot.1 += 1;
            }
        }

        Self {
            total_analyses: records.len(),
            total_findings: records.iter().map(|r| r.summary.total_findings).sum(),
            by_processing_method,
            by_category,
            mean_confidence_by_method: confidence_sums
                .into_iter()
                .map(|(method, (sum, n))| (method, sum / n as f64))
                .collect(),
            latest: records.iter().map(|r| r.created_at).max(),
        }
    }
}

fn read_record(path: &Path) -> Result<AnalysisRecord, StorageError> {
    let bytes = fs::read(path).map_err(io_err(path))?;
    serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// SHA-256 of a file, lower-case hex.
pub fn file_sha256(path: &Path) -> Result<String, StorageError> {
    let mut file = fs::File::open(path).map_err(io_err(path))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf).map_err(io_err(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
