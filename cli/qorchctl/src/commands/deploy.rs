//! Ledger node configuration deploys.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use qorch_deploy::{ConfigVersion, DeployOutcome, RollbackOutcome};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_info, print_output, print_single, print_success, print_warning, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Configuration file (.json or .toml).
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Version label, or any unique part of it.
    pub label: String,
}

pub async fn deploy(ctx: CommandContext, args: DeployArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let outcome = engine.deployer.deploy(&args.file).await;

    if ctx.format == OutputFormat::Json {
        print_single(&outcome);
    }

    match outcome {
        DeployOutcome::Succeeded { version, warnings } => {
            if ctx.format == OutputFormat::Table {
                for warning in &warnings {
                    print_warning(warning);
                }
                print_success(&format!(
                    "Deployed {} as version {}",
                    args.file.display(),
                    version.label
                ));
            }
            Ok(())
        }
        DeployOutcome::Rejected { reason } => Err(CliError::Deploy(reason).into()),
        DeployOutcome::Invalid { error } => {
            Err(CliError::Deploy(format!("{} is invalid: {error}", args.file.display())).into())
        }
        DeployOutcome::Failed { version, error } => {
            if let (Some(version), OutputFormat::Table) = (&version, ctx.format) {
                print_info(&format!("Snapshot kept as version {}", version.label));
            }
            Err(CliError::Deploy(error).into())
        }
    }
}

pub async fn rollback(ctx: CommandContext, args: RollbackArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let outcome = engine.deployer.rollback(&args.label).await;

    if ctx.format == OutputFormat::Json {
        print_single(&outcome);
    }

    match outcome {
        RollbackOutcome::Succeeded { version } => {
            if ctx.format == OutputFormat::Table {
                print_success(&format!("Rolled back to version {}", version.label));
            }
            Ok(())
        }
        RollbackOutcome::Rejected { reason } => Err(CliError::Deploy(reason).into()),
        RollbackOutcome::NotFound { label } => {
            Err(CliError::Deploy(format!("no stored version matches '{label}'")).into())
        }
        RollbackOutcome::Failed { error, .. } => Err(CliError::Deploy(error).into()),
    }
}

#[derive(Debug, Serialize, Tabled)]
struct VersionRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Path")]
    path: String,
}

impl From<ConfigVersion> for VersionRow {
    fn from(v: ConfigVersion) -> Self {
        Self {
            label: v.label,
            format: v.format.to_string(),
            path: v.path.display().to_string(),
        }
    }
}

pub async fn versions(ctx: CommandContext) -> Result<()> {
    let engine = ctx.engine()?;
    let versions = engine.deployer.list_versions().await?;

    let rows: Vec<VersionRow> = versions.into_iter().map(Into::into).collect();
    print_output(&rows, ctx.format);
    Ok(())
}
