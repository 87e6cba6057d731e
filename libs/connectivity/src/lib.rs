//! Dependency reachability for qorch.
//!
//! Two external dependencies matter to the engine:
//!
//! - **Control plane**: the cloud API used to confirm credentials work and to
//!   ask whether compute is available in a region.
//! - **Ledger network**: a JSON-RPC node endpoint that configuration deploys
//!   are pushed to.
//!
//! Both sit behind narrow capability traits ([`ControlPlaneClient`],
//! [`LedgerClient`], [`SecretStore`]) so the probe can be exercised with
//! doubles. [`ConnectivityProbe`] retries each check through
//! `qorch-resilience` and never fails outright.

pub mod control_plane;
pub mod error;
pub mod ledger;
pub mod probe;
pub mod secrets;
pub mod state;

pub use control_plane::{ControlPlaneClient, MockControlPlane};
pub use error::ProbeError;
pub use ledger::{JsonRpcLedgerClient, LedgerClient};
pub use probe::{ConnectivityProbe, ProbeSettings, RegionHealth};
pub use secrets::{DirSecretStore, SecretStore, LEDGER_ENDPOINT_SECRET};
pub use state::{ConnectionState, ServiceCheck};
