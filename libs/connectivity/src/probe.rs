//! Connectivity probe.
//!
//! Checks the two external dependencies independently and folds the results
//! into a [`ConnectionState`]. The probe never fails: every internal error
//! degrades to "unavailable" plus a message.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qorch_resilience::{RetryExecutor, RetryOptions};
use tracing::{debug, info, warn};

use crate::control_plane::ControlPlaneClient;
use crate::error::ProbeError;
use crate::ledger::LedgerClient;
use crate::secrets::{SecretStore, LEDGER_ENDPOINT_SECRET};
use crate::state::{ConnectionState, ServiceCheck};

/// Page size for the control-plane reachability call.
const REACHABILITY_PAGE_SIZE: u32 = 1;

/// Identifiers and endpoints the probe needs. All optional.
#[derive(Debug, Clone, Default)]
pub struct ProbeSettings {
    /// Control-plane subscription identifier.
    pub subscription_id: Option<String>,

    /// Control-plane tenant identifier.
    pub tenant_id: Option<String>,

    /// Ledger JSON-RPC endpoint; takes precedence over the secret store.
    pub ledger_endpoint: Option<String>,

    /// Secret store (vault) holding the ledger endpoint.
    pub secret_store_name: Option<String>,
}

impl ProbeSettings {
    /// Both control-plane identifiers are present and non-blank.
    pub fn has_control_plane_credentials(&self) -> bool {
        is_present(&self.subscription_id) && is_present(&self.tenant_id)
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Source of per-region health used to gate allocations and score regions.
#[async_trait]
pub trait RegionHealth: Send + Sync {
    /// Health for each requested region; regions with unknown health map to `true`.
    async fn region_health(&self, regions: &[String]) -> BTreeMap<String, bool>;
}

/// Probes the control plane and the ledger endpoint.
pub struct ConnectivityProbe {
    settings: ProbeSettings,
    control_plane: Arc<dyn ControlPlaneClient>,
    ledger: Arc<dyn LedgerClient>,
    secrets: Option<Arc<dyn SecretStore>>,
    control_plane_retry: RetryOptions,
    ledger_retry: RetryOptions,
}

impl ConnectivityProbe {
    /// Create a probe with the default retry budgets (2 retries, 500 ms initial delay).
    pub fn new(
        settings: ProbeSettings,
        control_plane: Arc<dyn ControlPlaneClient>,
        ledger: Arc<dyn LedgerClient>,
    ) -> Self {
        Self {
            settings,
            control_plane,
            ledger,
            secrets: None,
            control_plane_retry: probe_retry("control-plane-reachability"),
            ledger_retry: probe_retry("ledger-reachability"),
        }
    }

    /// Resolve the ledger endpoint through a secret store when it is not configured directly.
    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Override both retry budgets (names are kept).
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.control_plane_retry = RetryOptions {
            name: self.control_plane_retry.name.clone(),
            ..retry.clone()
        };
        self.ledger_retry = RetryOptions {
            name: self.ledger_retry.name.clone(),
            ..retry
        };
        self
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Probe both dependencies.
    pub async fn check_connections(&self) -> ConnectionState {
        let control_plane = self.check_control_plane().await;
        let network = self.check_network().await;

        let messages: Vec<String> = [&control_plane, &network]
            .into_iter()
            .filter_map(|check| check.message.clone())
            .collect();

        let state = ConnectionState {
            control_plane_connected: control_plane.available,
            network_available: network.available,
            messages,
        };

        info!(
            control_plane_connected = state.control_plane_connected,
            network_available = state.network_available,
            "Connectivity checked"
        );
        state
    }

    /// Control-plane reachability.
    ///
    /// Without credentials no call is made.
    pub async fn check_control_plane(&self) -> ServiceCheck {
        if !self.settings.has_control_plane_credentials() {
            warn!("Control plane credentials not configured; skipping reachability call");
            return ServiceCheck::unavailable(
                "Control plane credentials missing: subscription and tenant identifiers are required",
            );
        }

        let executor = RetryExecutor::new(self.control_plane_retry.clone());
        let result = executor
            .execute(|| async {
                let groups = self
                    .control_plane
                    .list_resource_groups(REACHABILITY_PAGE_SIZE)
                    .await?;
                if groups.is_empty() {
                    return Err(ProbeError::EmptyResponse(
                        "resource group listing".to_string(),
                    ));
                }
                Ok::<(), ProbeError>(())
            })
            .await;

        match result {
            Ok(()) => ServiceCheck::ok(),
            Err(e) => {
                warn!(error = %e, "Control plane unreachable");
                ServiceCheck::unavailable(format!("Control plane unreachable: {}", e.last_error()))
            }
        }
    }

    /// Ledger endpoint reachability.
    pub async fn check_network(&self) -> ServiceCheck {
        let Some(endpoint) = self.resolve_ledger_endpoint().await else {
            warn!("No ledger endpoint configured or stored");
            return ServiceCheck::unavailable(
                "Ledger network endpoint not configured and not found in secret store",
            );
        };

        let executor = RetryExecutor::new(self.ledger_retry.clone());
        let result = executor.execute(|| self.ledger.probe(&endpoint)).await;

        match result {
            Ok(()) => ServiceCheck::ok(),
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Ledger network unavailable");
                ServiceCheck::unavailable(format!(
                    "Ledger network unavailable at {}: {}",
                    endpoint,
                    e.last_error()
                ))
            }
        }
    }

    /// Configured endpoint, else the secret store entry, else `None`.
    pub async fn resolve_ledger_endpoint(&self) -> Option<String> {
        if let Some(endpoint) = self
            .settings
            .ledger_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        {
            return Some(endpoint.to_string());
        }

        let vault = self
            .settings
            .secret_store_name
            .as_deref()
            .filter(|v| !v.trim().is_empty())?;
        let secrets = self.secrets.as_ref()?;

        match secrets.get_secret(vault, LEDGER_ENDPOINT_SECRET).await {
            Ok(Some(endpoint)) => {
                debug!(vault, "Resolved ledger endpoint from secret store");
                Some(endpoint)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(vault, error = %e, "Failed to read ledger endpoint from secret store");
                None
            }
        }
    }

    /// Compute-service health per region.
    ///
    /// Optimistic: when the control plane is unreachable, or a lookup fails,
    /// the region is reported healthy so recommendations are never blocked.
    pub async fn check_compute_services_in_regions(
        &self,
        regions: &[String],
    ) -> BTreeMap<String, bool> {
        let optimistic = || regions.iter().map(|r| (r.clone(), true)).collect();

        if !self.check_control_plane().await.available {
            debug!("Control plane unreachable; assuming all regions healthy");
            return optimistic();
        }

        let mut health = BTreeMap::new();
        for region in regions {
            let healthy = match self.control_plane.compute_available(region).await {
                Ok(healthy) => healthy,
                Err(e) => {
                    warn!(region = %region, error = %e, "Region health lookup failed; assuming healthy");
                    true
                }
            };
            health.insert(region.clone(), healthy);
        }
        health
    }
}

#[async_trait]
impl RegionHealth for ConnectivityProbe {
    async fn region_health(&self, regions: &[String]) -> BTreeMap<String, bool> {
        self.check_compute_services_in_regions(regions).await
    }
}

fn probe_retry(name: &str) -> RetryOptions {
    RetryOptions::named(name)
        .with_max_retries(2)
        .with_initial_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(5))
}
