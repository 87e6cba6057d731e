//! Ledger (JSON-RPC) reachability.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::ProbeError;

/// JSON-RPC method used as the liveness probe.
pub const PROBE_METHOD: &str = "eth_blockNumber";

/// Capability for probing a ledger node endpoint.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Issue a single probe request; `Ok` means the node answered with a success status.
    async fn probe(&self, endpoint: &str) -> Result<(), ProbeError>;
}

/// Probes a ledger node over HTTP JSON-RPC.
pub struct JsonRpcLedgerClient {
    client: reqwest::Client,
}

impl JsonRpcLedgerClient {
    /// Create a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn probe(&self, endpoint: &str) -> Result<(), ProbeError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": PROBE_METHOD,
            "params": [],
            "id": 1,
        });
        debug!(endpoint = %endpoint, method = PROBE_METHOD, "Probing ledger endpoint");

        let response = self.client.post(endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Ledger probe failed");
            return Err(ProbeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
