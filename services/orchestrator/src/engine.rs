//! Component wiring shared by the HTTP service and the CLI.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use qorch_connectivity::{ConnectivityProbe, DirSecretStore, JsonRpcLedgerClient, MockControlPlane};
use qorch_deploy::{CommandDeployer, Deployer, MockDeployer, VersionStore, VersionedConfigDeployer};
use qorch_quota::{
    parse_quota_source, AllocationLedger, AllocationLog, QuotaSource, QuotaStore,
    RecommendationScorer,
};
use tracing::{info, warn};

use crate::config::Config;

/// Fully wired engine components.
pub struct Engine {
    pub probe: Arc<ConnectivityProbe>,
    pub ledger: AllocationLedger,
    pub scorer: RecommendationScorer,
    pub deployer: VersionedConfigDeployer,
    pub config: Config,
}

impl Engine {
    /// Build every component from `config`.
    ///
    /// Fails if the quota file is missing or the backing files do not parse.
    pub fn build(config: Config) -> Result<Self> {
        let probe = Arc::new(build_probe(&config)?);

        let store = QuotaStore::open(&config.quota_file)
            .with_context(|| format!("cannot open quota table {}", config.quota_file.display()))?;
        let log = match &config.allocations_file {
            Some(path) => AllocationLog::new(path),
            None => AllocationLog::beside(&store),
        };
        // Region health is attached by callers so they control where the
        // probe runs relative to any ledger lock.
        let ledger = AllocationLedger::open(store, log).context("failed to load quota state")?;

        let scorer = RecommendationScorer::default().with_region_health(probe.clone());

        let target: Arc<dyn Deployer> = match config
            .deploy_command
            .as_deref()
            .and_then(CommandDeployer::from_command_line)
        {
            Some(command) => Arc::new(command),
            None => {
                warn!("QORCH_DEPLOY_COMMAND not set; using mock deployer");
                Arc::new(MockDeployer::new())
            }
        };
        let deployer = VersionedConfigDeployer::new(
            probe.clone(),
            VersionStore::new(&config.versions_dir),
            target,
        );

        info!(
            quota_file = %config.quota_file.display(),
            versions_dir = %config.versions_dir.display(),
            regions = ledger.table().regions().count(),
            allocations = ledger.allocations().len(),
            "Engine initialised"
        );

        Ok(Self {
            probe,
            ledger,
            scorer,
            deployer,
            config,
        })
    }

    /// The configured quota refresh source.
    pub fn quota_source(&self) -> Result<Box<dyn QuotaSource>> {
        quota_source(&self.config)
    }
}

/// Build the refresh source named by `QORCH_QUOTA_SOURCE`.
pub fn quota_source(config: &Config) -> Result<Box<dyn QuotaSource>> {
    let location = config
        .quota_source
        .as_deref()
        .ok_or_else(|| anyhow!("QORCH_QUOTA_SOURCE is not configured"))?;
    parse_quota_source(location, config.request_timeout).context("invalid quota source")
}

fn build_probe(config: &Config) -> Result<ConnectivityProbe> {
    let control_plane =
        MockControlPlane::new().with_unhealthy_regions(config.unhealthy_regions.iter().cloned());
    let ledger = JsonRpcLedgerClient::new(config.request_timeout)
        .context("failed to build ledger JSON-RPC client")?;

    let mut probe = ConnectivityProbe::new(
        config.probe.clone(),
        Arc::new(control_plane),
        Arc::new(ledger),
    );
    if let Some(dir) = &config.secrets_dir {
        probe = probe.with_secret_store(Arc::new(DirSecretStore::new(dir)));
    }
    Ok(probe)
}
