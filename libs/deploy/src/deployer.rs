//! Deployment target capability.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::DeployError;
use crate::version::ConfigVersion;

/// Pushes a stored configuration version to the ledger nodes.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, version: &ConfigVersion, contents: &str) -> Result<(), DeployError>;
}

/// A configuration the mock was asked to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDeploy {
    pub label: String,
    pub contents: String,
}

/// In-memory deployer for development and tests.
#[derive(Debug, Default)]
pub struct MockDeployer {
    deployed: Mutex<Vec<RecordedDeploy>>,
    /// Calls left that fail before deploys start succeeding.
    failures_left: AtomicU32,
    always_fail: bool,
}

impl MockDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every deploy fails.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// The first `n` deploys fail, later ones succeed.
    pub fn failing_times(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            ..Self::default()
        }
    }

    /// Successful deploys, oldest first.
    pub fn deployments(&self) -> Vec<RecordedDeploy> {
        self.deployed
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn deploy(&self, version: &ConfigVersion, contents: &str) -> Result<(), DeployError> {
        info!(label = %version.label, bytes = contents.len(), "[MOCK] Deploying configuration");

        let transient = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.always_fail || transient {
            warn!(label = %version.label, "[MOCK] Deployment failed");
            return Err(DeployError::Invocation(
                "mock deployer configured to fail".to_string(),
            ));
        }

        if let Ok(mut deployed) = self.deployed.lock() {
            deployed.push(RecordedDeploy {
                label: version.label.clone(),
                contents: contents.to_string(),
            });
        }
        info!(label = %version.label, "[MOCK] Configuration deployed");
        Ok(())
    }
}

/// Runs an external program with the version file path as its last argument.
/// A non-zero exit status is a failed deploy.
#[derive(Debug, Clone)]
pub struct CommandDeployer {
    program: String,
    args: Vec<String>,
}

impl CommandDeployer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line. `None` if blank.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl Deployer for CommandDeployer {
    async fn deploy(&self, version: &ConfigVersion, _contents: &str) -> Result<(), DeployError> {
        debug!(
            program = %self.program,
            path = %version.path.display(),
            "Invoking deploy command"
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(&version.path)
            .output()
            .await
            .map_err(|e| DeployError::Invocation(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployError::Invocation(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        info!(program = %self.program, label = %version.label, "Deploy command succeeded");
        Ok(())
    }
}
