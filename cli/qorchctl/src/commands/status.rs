//! Dependency connectivity.

use anyhow::Result;
use colored::Colorize;

use crate::error::CliError;
use crate::output::{print_single, OutputFormat};

use super::CommandContext;

fn mark(ok: bool) -> colored::ColoredString {
    if ok {
        "connected".green()
    } else {
        "unavailable".red()
    }
}

pub async fn status(ctx: CommandContext) -> Result<()> {
    let engine = ctx.engine()?;
    let state = engine.probe.check_connections().await;

    match ctx.format {
        OutputFormat::Json => print_single(&state),
        OutputFormat::Table => {
            println!("Control plane: {}", mark(state.control_plane_connected));
            println!("Ledger:        {}", mark(state.network_available));
            for message in &state.messages {
                println!("  {} {}", "-".dimmed(), message);
            }
        }
    }

    if !state.is_fully_connected() {
        return Err(CliError::NoResult("one or more dependencies are unavailable".to_string()).into());
    }
    Ok(())
}
