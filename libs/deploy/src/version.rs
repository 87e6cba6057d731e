//! Timestamped configuration snapshots.
//!
//! Each deploy stores the configuration as
//! `besu-config-<YYYY-MM-DDTHH-MM-SS>.<ext>` in the versions directory.
//! Contents are staged in a hidden temp file and linked into place, so a
//! version is never overwritten or visible half-written, and a second save
//! within the same second fails with [`DeployError::VersionExists`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::DeployError;
use crate::format::ConfigFormat;

/// File name prefix for stored versions.
pub const VERSION_FILE_PREFIX: &str = "besu-config-";

/// `chrono` format of a version label.
pub const VERSION_LABEL_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// One stored configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub label: String,
    pub path: PathBuf,
    pub format: ConfigFormat,
}

impl ConfigVersion {
    /// Parse a stored file name. Returns `None` for unrelated files.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let label = stem.strip_prefix(VERSION_FILE_PREFIX)?;
        let format = ConfigFormat::from_path(path)?;
        if label.is_empty() {
            return None;
        }
        Some(Self {
            label: label.to_string(),
            path: path.to_path_buf(),
            format,
        })
    }

    pub fn file_name(label: &str, format: ConfigFormat) -> String {
        format!("{VERSION_FILE_PREFIX}{label}.{}", format.extension())
    }
}

/// Label for a snapshot taken at `at`.
pub fn version_label(at: DateTime<Utc>) -> String {
    at.format(VERSION_LABEL_FORMAT).to_string()
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn write_staged(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged version");
        }
    }
}

/// Directory of configuration snapshots.
#[derive(Debug, Clone)]
pub struct VersionStore {
    dir: PathBuf,
}

impl VersionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `contents` as a new version labelled from `at`.
    pub async fn save(
        &self,
        contents: &str,
        format: ConfigFormat,
        at: DateTime<Utc>,
    ) -> Result<ConfigVersion, DeployError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DeployError::io(&self.dir, e))?;

        let label = version_label(at);
        let path = self.dir.join(ConfigVersion::file_name(&label, format));

        // Stage the contents, then link into place: the link fails if the
        // label is taken, and a visible version is always complete.
        let staging = self.staging_path(&path);
        if let Err(e) = write_staged(&staging, contents).await {
            discard(&staging).await;
            return Err(DeployError::io(&staging, e));
        }

        let linked = tokio::fs::hard_link(&staging, &path).await;
        discard(&staging).await;
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(label = %label, "Configuration version already exists");
                return Err(DeployError::VersionExists(label));
            }
            Err(e) => return Err(DeployError::io(&path, e)),
        }

        info!(label = %label, path = %path.display(), "Saved configuration version");
        Ok(ConfigVersion {
            label,
            path,
            format,
        })
    }

    fn staging_path(&self, path: &Path) -> PathBuf {
        let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir.join(format!(".{name}.{}-{n}.tmp", std::process::id()))
    }

    /// All versions in ascending file-name order. A missing directory has none.
    pub async fn list(&self) -> Result<Vec<ConfigVersion>, DeployError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DeployError::io(&self.dir, e)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DeployError::io(&self.dir, e))?
        {
            if let Some(version) = ConfigVersion::from_path(&entry.path()) {
                versions.push(version);
            }
        }

        versions.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(versions)
    }

    /// First version (in listing order) whose label contains `label`.
    pub async fn find(&self, label: &str) -> Result<Option<ConfigVersion>, DeployError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|v| v.label.contains(label)))
    }

    pub async fn read(&self, version: &ConfigVersion) -> Result<String, DeployError> {
        tokio::fs::read_to_string(&version.path)
            .await
            .map_err(|e| DeployError::io(&version.path, e))
    }
}
