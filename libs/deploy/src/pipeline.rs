//! Deploy and rollback of versioned ledger node configuration.
//!
//! ```text
//! deploy:   preflight -> validate -> save version -> invoke deployer
//! rollback: preflight -> find version -> invoke deployer
//! ```
//!
//! Preflight requires the ledger network to be reachable. Saving and
//! invoking are each retried; a deploy that fails after its version was
//! saved keeps the version so it can be retried or rolled back to later.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use qorch_connectivity::ConnectivityProbe;
use qorch_resilience::{RetryExecutor, RetryOptions};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::deployer::Deployer;
use crate::error::DeployError;
use crate::format::validate;
use crate::version::{ConfigVersion, VersionStore};

/// Result of [`VersionedConfigDeployer::deploy`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// Preflight failed; nothing was written.
    Rejected { reason: String },
    /// The file did not validate; nothing was written.
    Invalid { error: String },
    Succeeded {
        version: ConfigVersion,
        warnings: Vec<String>,
    },
    /// Saving or invoking failed. `version` is set when the snapshot was kept.
    Failed {
        version: Option<ConfigVersion>,
        error: String,
    },
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Succeeded { .. })
    }
}

/// Result of [`VersionedConfigDeployer::rollback`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Rejected { reason: String },
    NotFound { label: String },
    Succeeded { version: ConfigVersion },
    Failed {
        version: Option<ConfigVersion>,
        error: String,
    },
}

impl RollbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RollbackOutcome::Succeeded { .. })
    }
}

pub struct VersionedConfigDeployer {
    probe: Arc<ConnectivityProbe>,
    versions: VersionStore,
    deployer: Arc<dyn Deployer>,
    save_retry: RetryOptions,
    invoke_retry: RetryOptions,
}

impl VersionedConfigDeployer {
    pub fn new(
        probe: Arc<ConnectivityProbe>,
        versions: VersionStore,
        deployer: Arc<dyn Deployer>,
    ) -> Self {
        Self {
            probe,
            versions,
            deployer,
            // Same-second collisions need at least a second between attempts.
            save_retry: RetryOptions::named("config-version-save")
                .with_max_retries(2)
                .with_initial_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(4))
                .with_jitter(false),
            invoke_retry: RetryOptions::named("config-deploy")
                .with_max_retries(2)
                .with_initial_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(10)),
        }
    }

    /// Override retry policies. Operation names are kept.
    pub fn with_retry(mut self, save: RetryOptions, invoke: RetryOptions) -> Self {
        self.save_retry = RetryOptions {
            name: self.save_retry.name.clone(),
            ..save
        };
        self.invoke_retry = RetryOptions {
            name: self.invoke_retry.name.clone(),
            ..invoke
        };
        self
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub async fn list_versions(&self) -> Result<Vec<ConfigVersion>, DeployError> {
        self.versions.list().await
    }

    /// Validate, snapshot and deploy the configuration at `path`.
    pub async fn deploy(&self, path: &Path) -> DeployOutcome {
        info!(path = %path.display(), "Starting configuration deploy");

        if let Err(reason) = self.preflight().await {
            warn!(path = %path.display(), reason = %reason, "Deploy rejected");
            return DeployOutcome::Rejected { reason };
        }

        let config = match validate(path).await {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Configuration invalid");
                return DeployOutcome::Invalid {
                    error: e.to_string(),
                };
            }
        };

        let save = RetryExecutor::new(self.save_retry.clone())
            .execute(|| {
                self.versions
                    .save(&config.contents, config.format, Utc::now())
            })
            .await;
        let version = match save {
            Ok(version) => version,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to save configuration version");
                return DeployOutcome::Failed {
                    version: None,
                    error: e.to_string(),
                };
            }
        };

        match self.invoke(&version, &config.contents).await {
            Ok(()) => {
                info!(label = %version.label, "Configuration deployed");
                DeployOutcome::Succeeded {
                    version,
                    warnings: config.warnings,
                }
            }
            Err(error) => DeployOutcome::Failed {
                version: Some(version),
                error,
            },
        }
    }

    /// Redeploy the first stored version whose label contains `label`.
    pub async fn rollback(&self, label: &str) -> RollbackOutcome {
        info!(label, "Starting configuration rollback");

        if let Err(reason) = self.preflight().await {
            warn!(label, reason = %reason, "Rollback rejected");
            return RollbackOutcome::Rejected { reason };
        }

        let version = match self.versions.find(label).await {
            Ok(Some(version)) => version,
            Ok(None) => {
                warn!(label, "No configuration version matches label");
                return RollbackOutcome::NotFound {
                    label: label.to_string(),
                };
            }
            Err(e) => {
                return RollbackOutcome::Failed {
                    version: None,
                    error: e.to_string(),
                };
            }
        };

        let contents = match self.versions.read(&version).await {
            Ok(contents) => contents,
            Err(e) => {
                return RollbackOutcome::Failed {
                    version: Some(version),
                    error: e.to_string(),
                };
            }
        };

        match self.invoke(&version, &contents).await {
            Ok(()) => {
                info!(label = %version.label, "Rolled back configuration");
                RollbackOutcome::Succeeded { version }
            }
            Err(error) => RollbackOutcome::Failed {
                version: Some(version),
                error,
            },
        }
    }

    async fn preflight(&self) -> Result<(), String> {
        if !self.probe.settings().has_control_plane_credentials() {
            warn!("Control plane credentials not configured; continuing");
        }

        let network = self.probe.check_network().await;
        if network.available {
            Ok(())
        } else {
            Err(network
                .message
                .unwrap_or_else(|| "ledger network unavailable".to_string()))
        }
    }

    async fn invoke(&self, version: &ConfigVersion, contents: &str) -> Result<(), String> {
        RetryExecutor::new(self.invoke_retry.clone())
            .execute(|| self.deployer.deploy(version, contents))
            .await
            .map_err(|e| {
                error!(label = %version.label, error = %e, "Deployment failed");
                e.last_error().to_string()
            })
    }
}
