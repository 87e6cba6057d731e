//! Quota table and allocation log persistence.
//!
//! Both files are JSON and are rewritten in full on every save using
//! write-to-temp + rename, so a reader never sees a half-written file.
//!
//! There is no cross-process locking: two processes saving the allocation
//! log concurrently race, and the last writer wins.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::QuotaError;
use crate::model::{QuotaAllocation, QuotaTable};

/// Allocation log file format version.
const LOG_VERSION: u32 = 1;

/// Canonical quota table file.
#[derive(Debug, Clone)]
pub struct QuotaStore {
    path: PathBuf,
}

impl QuotaStore {
    /// Open the store, failing fast if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, QuotaError> {
        let path = path.into();
        if !path.is_file() {
            return Err(QuotaError::ConfigNotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the table. Structure only; no semantic validation.
    pub fn load(&self) -> Result<QuotaTable, QuotaError> {
        let table: QuotaTable = read_json(&self.path)?;
        info!(
            path = %self.path.display(),
            regions = table.regions().count(),
            entries = table.len(),
            "Loaded quota table"
        );
        Ok(table)
    }

    pub fn save(&self, table: &QuotaTable) -> Result<(), QuotaError> {
        write_json_atomic(&self.path, table)?;
        debug!(path = %self.path.display(), entries = table.len(), "Saved quota table");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLog {
    version: u32,
    allocations: Vec<QuotaAllocation>,
}

/// Allocation audit log, kept separately from the quota table.
#[derive(Debug, Clone)]
pub struct AllocationLog {
    path: PathBuf,
}

impl AllocationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default log location: `allocations.json` next to the quota file.
    pub fn beside(store: &QuotaStore) -> Self {
        let dir = store.path().parent().unwrap_or_else(|| Path::new("."));
        Self::new(dir.join("allocations.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all allocations; a missing file is an empty log.
    pub fn load(&self) -> Result<Vec<QuotaAllocation>, QuotaError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No allocation log, starting empty");
            return Ok(Vec::new());
        }

        let log: PersistedLog = read_json(&self.path)?;
        if log.version != LOG_VERSION {
            return Err(QuotaError::Parse {
                path: self.path.display().to_string(),
                message: format!(
                    "unsupported allocation log version {} (expected {})",
                    log.version, LOG_VERSION
                ),
            });
        }

        info!(
            path = %self.path.display(),
            allocations = log.allocations.len(),
            "Loaded allocation log"
        );
        Ok(log.allocations)
    }

    /// Rewrite the full log.
    pub fn save(&self, allocations: &[QuotaAllocation]) -> Result<(), QuotaError> {
        let log = PersistedLog {
            version: LOG_VERSION,
            allocations: allocations.to_vec(),
        };
        write_json_atomic(&self.path, &log)?;
        debug!(
            path = %self.path.display(),
            allocations = allocations.len(),
            "Saved allocation log"
        );
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, QuotaError> {
    let content = fs::read_to_string(path).map_err(|e| QuotaError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| QuotaError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), QuotaError> {
    let write_err = |message: String| QuotaError::Write {
        path: path.display().to_string(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }

    let content = serde_json::to_string_pretty(value).map_err(|e| write_err(e.to_string()))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content).map_err(|e| write_err(e.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|e| write_err(e.to_string()))?;
    Ok(())
}
