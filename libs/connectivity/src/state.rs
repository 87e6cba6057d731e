//! Aggregated dependency health.

use serde::{Deserialize, Serialize};

/// Result of probing both external dependencies.
///
/// Built fresh on every probe; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Cloud control plane answered a read-only list call.
    pub control_plane_connected: bool,

    /// Ledger JSON-RPC endpoint answered with a success status.
    pub network_available: bool,

    /// One human-readable message per negative finding, in probe order.
    pub messages: Vec<String>,
}

impl ConnectionState {
    /// Both dependencies are reachable.
    pub fn is_fully_connected(&self) -> bool {
        self.control_plane_connected && self.network_available
    }
}

/// Outcome of probing a single dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub available: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceCheck {
    pub(crate) fn ok() -> Self {
        Self {
            available: true,
            message: None,
        }
    }

    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: Some(message.into()),
        }
    }
}
