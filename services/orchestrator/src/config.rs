use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use qorch_connectivity::ProbeSettings;

/// Engine and service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    /// Canonical quota table. Must exist.
    pub quota_file: PathBuf,
    /// Allocation log; defaults to `allocations.json` beside the quota file.
    pub allocations_file: Option<PathBuf>,
    /// File path or URL used by quota refresh.
    pub quota_source: Option<String>,
    pub versions_dir: PathBuf,
    /// Root of the directory-backed secret store.
    pub secrets_dir: Option<PathBuf>,
    /// Regions the mock control plane reports as unhealthy.
    pub unhealthy_regions: Vec<String>,
    /// External deploy command; the mock deployer is used when unset.
    pub deploy_command: Option<String>,
    pub request_timeout: Duration,
    pub probe: ProbeSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = var("QORCH_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("QORCH_LISTEN_ADDR is not a valid socket address")?;

        let log_level = var("QORCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let quota_file = var("QORCH_QUOTA_FILE")
            .map(PathBuf::from)
            .context("QORCH_QUOTA_FILE must be set")?;

        let request_timeout = match var("QORCH_REQUEST_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .context("QORCH_REQUEST_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            None => Duration::from_secs(10),
        };

        let unhealthy_regions = var("QORCH_UNHEALTHY_REGIONS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        Ok(Self {
            listen_addr,
            log_level,
            quota_file,
            allocations_file: var("QORCH_ALLOCATIONS_FILE").map(PathBuf::from),
            quota_source: var("QORCH_QUOTA_SOURCE"),
            versions_dir: var("QORCH_VERSIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config-versions")),
            secrets_dir: var("QORCH_SECRETS_DIR").map(PathBuf::from),
            unhealthy_regions,
            deploy_command: var("QORCH_DEPLOY_COMMAND"),
            request_timeout,
            probe: ProbeSettings {
                subscription_id: var("AZURE_SUBSCRIPTION_ID"),
                tenant_id: var("AZURE_TENANT_ID"),
                ledger_endpoint: var("BESU_RPC_URL"),
                secret_store_name: var("AZURE_KEY_VAULT_NAME"),
            },
        })
    }
}

/// Comma-separated list, trimmed, empties dropped.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
