//! Error handling and display for the CLI.

use colored::Colorize;
use qorch_deploy::DeployError;
use qorch_quota::{AllocationRejected, QuotaError};
use thiserror::Error;

/// Outcomes that end the command with exit status 1.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command ran but produced no usable result.
    #[error("{0}")]
    NoResult(String),

    #[error("Allocation rejected: {0}")]
    Rejected(#[from] AllocationRejected),

    #[error("Allocation not found: {0}")]
    AllocationNotFound(String),

    #[error("Deploy failed: {0}")]
    Deploy(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint_for(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(quota_err) = err.downcast_ref::<QuotaError>() {
        return match quota_err {
            QuotaError::ConfigNotFound(_) => {
                Some("Set QORCH_QUOTA_FILE or pass --quota-file with an existing quota table.")
            }
            QuotaError::SourceUnavailable(_) => {
                Some("Check QORCH_QUOTA_SOURCE and that the source is reachable.")
            }
            QuotaError::Parse { .. } => Some("The file must be valid JSON."),
            _ => None,
        };
    }

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Rejected(AllocationRejected::InsufficientQuota { .. }) => {
                Some("Run `qorch suggest-region <role>` to find capacity elsewhere.")
            }
            CliError::Rejected(AllocationRejected::RoleNotAssigned { .. }) => {
                Some("Run `qorch list-roles` to see which roles have quota.")
            }
            CliError::AllocationNotFound(_) => {
                Some("Run `qorch allocations --all` to list known allocations.")
            }
            CliError::Deploy(_) => Some("Run `qorch status` to check ledger connectivity."),
            _ => None,
        };
    }

    if err.downcast_ref::<DeployError>().is_some() {
        return Some("Check QORCH_VERSIONS_DIR is readable.");
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::Context;

    use super::*;

    #[test]
    fn test_hint_found_through_context() {
        let err: anyhow::Error = Err::<(), _>(QuotaError::ConfigNotFound(PathBuf::from("q.json")))
            .context("cannot open quota table")
            .unwrap_err();
        assert!(hint_for(&err).unwrap().contains("QORCH_QUOTA_FILE"));
    }

    #[test]
    fn test_rejection_hint() {
        let err = anyhow::Error::from(CliError::Rejected(AllocationRejected::InsufficientQuota {
            region: "eastus".to_string(),
            sku: "D2".to_string(),
            requested: 6,
            available: 5,
        }));
        assert!(hint_for(&err).unwrap().contains("suggest-region"));
        assert!(hint_for(&anyhow::anyhow!("plain")).is_none());
    }
}
