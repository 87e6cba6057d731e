//! Quota, allocation and recommendation commands.

use anyhow::Result;
use clap::Args;
use qorch_quota::{
    QuotaAllocation, RecommendationRequest, RecommendationResult, RegionAvailability,
};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ValidateQuotaArgs {
    pub region: String,
    pub role: String,

    /// Units required.
    #[arg(long, default_value = "1")]
    pub amount: i64,
}

#[derive(Debug, Args)]
pub struct SuggestRegionArgs {
    pub role: String,

    /// Minimum available units per SKU.
    #[arg(long, default_value = "1")]
    pub min_quota: i64,

    /// Preferred regions, most preferred first (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub preferred: Vec<String>,

    /// Required SKU features (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub features: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SummarizeArgs {
    pub role: String,
}

#[derive(Debug, Args)]
pub struct AllocateArgs {
    pub region: String,
    pub sku: String,
    pub role: String,
    pub amount: i64,

    /// Application the quota is reserved for.
    #[arg(long = "app")]
    pub application_id: String,
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Allocation ID.
    pub id: String,
}

#[derive(Debug, Args)]
pub struct AllocationsArgs {
    /// Include released and pending allocations.
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
struct ValidationResult {
    region: String,
    role: String,
    amount: i64,
    sufficient: bool,
}

pub async fn validate_quota(ctx: CommandContext, args: ValidateQuotaArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let sufficient = engine
        .ledger
        .validate_quota(&args.region, &args.role, args.amount);

    if ctx.format == OutputFormat::Json {
        print_single(&ValidationResult {
            region: args.region.clone(),
            role: args.role.clone(),
            amount: args.amount,
            sufficient,
        });
    }

    if !sufficient {
        return Err(CliError::NoResult(format!(
            "Insufficient quota for role '{}' in {} (need {})",
            args.role, args.region, args.amount
        ))
        .into());
    }

    if ctx.format == OutputFormat::Table {
        print_success(&format!(
            "Quota available for role '{}' in {} ({} unit(s))",
            args.role, args.region, args.amount
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "SKU")]
    sku: String,
    #[tabled(rename = "Available")]
    available_quota: i64,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Reasons")]
    reasons: String,
}

impl From<&RecommendationResult> for RecommendationRow {
    fn from(r: &RecommendationResult) -> Self {
        Self {
            region: r.region.clone(),
            sku: r.sku.clone(),
            available_quota: r.available_quota,
            confidence: format!("{:.1}", r.confidence),
            reasons: r.reasons.join("; "),
        }
    }
}

pub async fn suggest_region(ctx: CommandContext, args: SuggestRegionArgs) -> Result<()> {
    let request = RecommendationRequest::new(args.role, args.min_quota)
        .with_preferred_regions(args.preferred)
        .with_required_features(args.features);
    request.validate().map_err(CliError::from)?;

    let engine = ctx.engine()?;
    let results = engine.scorer.recommend(engine.ledger.table(), &request).await;

    if results.is_empty() {
        return Err(CliError::NoResult(format!(
            "No region has {} unit(s) available for role '{}'",
            request.minimum_quota, request.role
        ))
        .into());
    }

    match ctx.format {
        OutputFormat::Table => {
            let rows: Vec<RecommendationRow> = results.iter().map(Into::into).collect();
            print_output(&rows, ctx.format);
        }
        OutputFormat::Json => print_single(&results),
    }
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct AvailabilityRow {
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Total")]
    total: i64,
    #[tabled(rename = "Used")]
    used: i64,
    #[tabled(rename = "Reserved")]
    reserved: i64,
    #[tabled(rename = "Available")]
    available: i64,
    #[tabled(rename = "Usage %")]
    usage_percent: String,
}

impl From<RegionAvailability> for AvailabilityRow {
    fn from(a: RegionAvailability) -> Self {
        Self {
            region: a.region,
            total: a.total,
            used: a.used,
            reserved: a.reserved,
            available: a.available,
            usage_percent: a.usage_percent,
        }
    }
}

pub async fn summarize(ctx: CommandContext, args: SummarizeArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let summary = engine.ledger.summarize_availability(&args.role);

    if summary.is_empty() {
        return Err(CliError::NoResult(format!(
            "No quota is assigned to role '{}'",
            args.role
        ))
        .into());
    }

    let rows: Vec<AvailabilityRow> = summary.into_iter().map(Into::into).collect();
    print_output(&rows, ctx.format);
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct NameRow {
    #[tabled(rename = "Name")]
    name: String,
}

fn print_names(names: Vec<String>, format: OutputFormat) {
    let rows: Vec<NameRow> = names.into_iter().map(|name| NameRow { name }).collect();
    print_output(&rows, format);
}

pub async fn list_regions(ctx: CommandContext) -> Result<()> {
    let engine = ctx.engine()?;
    print_names(engine.ledger.list_regions(), ctx.format);
    Ok(())
}

pub async fn list_roles(ctx: CommandContext) -> Result<()> {
    let engine = ctx.engine()?;
    print_names(engine.ledger.list_roles(), ctx.format);
    Ok(())
}

pub async fn refresh(ctx: CommandContext) -> Result<()> {
    let mut engine = ctx.engine()?;
    let source = engine.quota_source()?;
    engine.ledger.refresh(source.as_ref()).await?;

    print_success(&format!(
        "Quota table refreshed from {} ({} entries)",
        source.describe(),
        engine.ledger.table().len()
    ));
    Ok(())
}

#[derive(Debug, Serialize)]
struct AllocationCreated {
    id: String,
}

pub async fn allocate(ctx: CommandContext, args: AllocateArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let mut ledger = engine.ledger.with_region_health(engine.probe.clone());

    let id = ledger
        .allocate(
            &args.region,
            &args.sku,
            &args.role,
            args.amount,
            &args.application_id,
        )
        .await
        .map_err(CliError::from)?;

    match ctx.format {
        OutputFormat::Table => print_success(&format!(
            "Allocated {} unit(s) of {} in {} for {} ({})",
            args.amount, args.sku, args.region, args.application_id, id
        )),
        OutputFormat::Json => print_single(&AllocationCreated { id }),
    }
    Ok(())
}

pub async fn release(ctx: CommandContext, args: ReleaseArgs) -> Result<()> {
    let mut engine = ctx.engine()?;
    if engine.ledger.allocation(&args.id).is_none() {
        return Err(CliError::AllocationNotFound(args.id).into());
    }
    if !engine.ledger.release(&args.id) {
        return Err(CliError::NoResult(format!("Failed to persist release of {}", args.id)).into());
    }

    print_success(&format!("Released allocation {}", args.id));
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct AllocationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "SKU")]
    sku: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Amount")]
    amount: i64,
    #[tabled(rename = "Application")]
    application_id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    timestamp: String,
}

impl From<&QuotaAllocation> for AllocationRow {
    fn from(a: &QuotaAllocation) -> Self {
        Self {
            id: a.id.clone(),
            region: a.region.clone(),
            sku: a.sku.clone(),
            role: a.role.clone(),
            amount: a.amount,
            application_id: a.application_id.clone(),
            status: a.status.to_string(),
            timestamp: a.timestamp.to_rfc3339(),
        }
    }
}

pub async fn allocations(ctx: CommandContext, args: AllocationsArgs) -> Result<()> {
    let engine = ctx.engine()?;
    let selected: Vec<&QuotaAllocation> = engine
        .ledger
        .allocations()
        .iter()
        .filter(|a| args.all || a.is_active())
        .collect();

    match ctx.format {
        OutputFormat::Table => {
            let rows: Vec<AllocationRow> = selected.into_iter().map(Into::into).collect();
            print_output(&rows, ctx.format);
        }
        OutputFormat::Json => print_single(&selected),
    }
    Ok(())
}
