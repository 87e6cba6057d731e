//! CLI commands.

mod deploy;
mod quota;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use qorch_orchestrator::{Config, Engine};
use tracing::debug;

use crate::output::OutputFormat;

/// qorch - quota allocation, region recommendations and config deploys.
#[derive(Debug, Parser)]
#[command(name = "qorch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Quota table file.
    #[arg(long, global = true, env = "QORCH_QUOTA_FILE")]
    quota_file: Option<PathBuf>,

    /// Allocation log file. Defaults to allocations.json beside the quota file.
    #[arg(long, global = true, env = "QORCH_ALLOCATIONS_FILE")]
    allocations_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check whether a role can get capacity in a region.
    ValidateQuota(quota::ValidateQuotaArgs),

    /// Recommend regions and SKUs for a role.
    SuggestRegion(quota::SuggestRegionArgs),

    /// Show per-region capacity for a role.
    SummarizeAvailability(quota::SummarizeArgs),

    /// List regions in the quota table.
    ListRegions,

    /// List roles with assigned quota.
    ListRoles,

    /// Replace the quota table from the configured quota source.
    RefreshQuota,

    /// Reserve quota for an application.
    Allocate(quota::AllocateArgs),

    /// Release an allocation.
    Release(quota::ReleaseArgs),

    /// List allocations.
    Allocations(quota::AllocationsArgs),

    /// Check control-plane and ledger connectivity.
    Status,

    /// Validate, snapshot and deploy a node configuration file.
    Deploy(deploy::DeployArgs),

    /// Redeploy a stored configuration version.
    Rollback(deploy::RollbackArgs),

    /// List stored configuration versions.
    Versions,

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        debug!(command = ?self.command, "Running command");
        let ctx = CommandContext {
            format: self.format,
            quota_file: self.quota_file,
            allocations_file: self.allocations_file,
        };

        match self.command {
            Commands::ValidateQuota(args) => quota::validate_quota(ctx, args).await,
            Commands::SuggestRegion(args) => quota::suggest_region(ctx, args).await,
            Commands::SummarizeAvailability(args) => quota::summarize(ctx, args).await,
            Commands::ListRegions => quota::list_regions(ctx).await,
            Commands::ListRoles => quota::list_roles(ctx).await,
            Commands::RefreshQuota => quota::refresh(ctx).await,
            Commands::Allocate(args) => quota::allocate(ctx, args).await,
            Commands::Release(args) => quota::release(ctx, args).await,
            Commands::Allocations(args) => quota::allocations(ctx, args).await,
            Commands::Status => status::status(ctx).await,
            Commands::Deploy(args) => deploy::deploy(ctx, args).await,
            Commands::Rollback(args) => deploy::rollback(ctx, args).await,
            Commands::Versions => deploy::versions(ctx).await,
            Commands::Version => {
                println!("qorch {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
    pub quota_file: Option<PathBuf>,
    pub allocations_file: Option<PathBuf>,
}

impl CommandContext {
    /// Environment configuration with file flags taking precedence.
    pub fn config(&self) -> Result<Config> {
        let quota_file = self.quota_file.as_ref().map(|p| p.display().to_string());
        let allocations_file = self
            .allocations_file
            .as_ref()
            .map(|p| p.display().to_string());

        Config::from_lookup(|key| match key {
            "QORCH_QUOTA_FILE" => quota_file.clone(),
            "QORCH_ALLOCATIONS_FILE" => allocations_file
                .clone()
                .or_else(|| std::env::var(key).ok()),
            _ => std::env::var(key).ok(),
        })
    }

    /// Build the engine from the backing files.
    pub fn engine(&self) -> Result<Engine> {
        Engine::build(self.config()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suggest_region_lists() {
        let cli = Cli::try_parse_from([
            "qorch",
            "--format",
            "json",
            "--quota-file",
            "/tmp/quota.json",
            "suggest-region",
            "validator",
            "--min-quota",
            "2",
            "--preferred",
            "eastus,westus",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.quota_file, Some(PathBuf::from("/tmp/quota.json")));
        match cli.command {
            Commands::SuggestRegion(args) => {
                assert_eq!(args.role, "validator");
                assert_eq!(args.min_quota, 2);
                assert_eq!(args.preferred, vec!["eastus", "westus"]);
                assert!(args.features.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = Cli::try_parse_from(["qorch", "--format", "jsn", "list-regions"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);

        let cli = Cli::try_parse_from(["qorch", "list-regions"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Table);
    }

    #[test]
    fn validate_quota_amount_defaults_to_one() {
        let cli = Cli::try_parse_from(["qorch", "validate-quota", "eastus", "validator"]).unwrap();
        match cli.command {
            Commands::ValidateQuota(args) => assert_eq!(args.amount, 1),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn quota_flag_overrides_environment() {
        let ctx = CommandContext {
            format: OutputFormat::Table,
            quota_file: Some(PathBuf::from("/srv/quota.json")),
            allocations_file: None,
        };
        let config = ctx.config().unwrap();
        assert_eq!(config.quota_file, PathBuf::from("/srv/quota.json"));
    }
}
