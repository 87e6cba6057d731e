//! Versioned configuration deploys for ledger nodes.
//!
//! Every deploy validates the file, stores a timestamped snapshot in a
//! versions directory and hands it to a [`Deployer`]. Any stored snapshot
//! can later be redeployed by label with
//! [`VersionedConfigDeployer::rollback`].

pub mod deployer;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod version;

pub use deployer::{CommandDeployer, Deployer, MockDeployer, RecordedDeploy};
pub use error::{DeployError, ValidationError};
pub use format::{validate, ConfigFormat, ValidatedConfig, RECOMMENDED_FIELDS};
pub use pipeline::{DeployOutcome, RollbackOutcome, VersionedConfigDeployer};
pub use version::{version_label, ConfigVersion, VersionStore};
