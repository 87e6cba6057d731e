//! Where refreshed quota tables come from.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::QuotaError;
use crate::model::QuotaTable;

/// Supplier of a fresh quota table.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<QuotaTable, QuotaError>;
}

/// Reads a table exported to a file by an external tool.
#[derive(Debug, Clone)]
pub struct FileQuotaSource {
    path: PathBuf,
}

impl FileQuotaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuotaSource for FileQuotaSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<QuotaTable, QuotaError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| QuotaError::SourceUnavailable(format!("{}: {}", self.describe(), e)))?;

        serde_json::from_str(&content).map_err(|e| QuotaError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Fetches a table with an HTTP GET returning the quota JSON document.
#[derive(Debug, Clone)]
pub struct HttpQuotaSource {
    client: reqwest::Client,
    url: String,
}

impl HttpQuotaSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, QuotaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuotaError::SourceUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl QuotaSource for HttpQuotaSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<QuotaTable, QuotaError> {
        debug!(url = %self.url, "Fetching quota table");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| QuotaError::SourceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuotaError::SourceUnavailable(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        response.json::<QuotaTable>().await.map_err(|e| QuotaError::Parse {
            path: self.url.clone(),
            message: e.to_string(),
        })
    }
}

/// Pick a source from a location string: `http(s)://` URLs are fetched,
/// anything else (optionally prefixed `file:`) is read from disk.
pub fn parse_quota_source(
    location: &str,
    timeout: Duration,
) -> Result<Box<dyn QuotaSource>, QuotaError> {
    let location = location.trim();
    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(Box::new(HttpQuotaSource::new(location, timeout)?));
    }
    let path = location.strip_prefix("file:").unwrap_or(location);
    if path.is_empty() {
        return Err(QuotaError::SourceUnavailable(
            "empty quota source location".to_string(),
        ));
    }
    Ok(Box::new(FileQuotaSource::new(path)))
}
