//! Secret store lookup for the ledger endpoint.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ProbeError;

/// Name of the secret holding the ledger RPC URL.
pub const LEDGER_ENDPOINT_SECRET: &str = "besu-rpc-url";

/// Capability for reading named secrets from a named store (vault).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when the secret does not exist.
    async fn get_secret(&self, vault: &str, name: &str) -> Result<Option<String>, ProbeError>;
}

/// Secrets mounted on disk as `<root>/<vault>/<name>`.
pub struct DirSecretStore {
    root: PathBuf,
}

impl DirSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretStore for DirSecretStore {
    async fn get_secret(&self, vault: &str, name: &str) -> Result<Option<String>, ProbeError> {
        let path = self.root.join(vault).join(name);
        debug!(path = %path.display(), "Reading secret");

        match tokio::fs::read_to_string(&path).await {
            Ok(value) => {
                let value = value.trim().to_string();
                Ok((!value.is_empty()).then_some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProbeError::Secret(format!("{}: {}", path.display(), e))),
        }
    }
}
