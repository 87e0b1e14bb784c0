//! Read command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rd200_core::{BleTransport, SessionConfig, run_session_with_config};
use rd200_types::RadonUnit;

use crate::cli::OutputFormat;
use crate::format::{format_snapshot_json, format_snapshot_text};
use crate::util::{Target, write_output};

pub async fn cmd_read(
    target: &Target,
    unit: RadonUnit,
    session_config: SessionConfig,
    format: OutputFormat,
    output: Option<&PathBuf>,
) -> Result<()> {
    let transport = BleTransport::new()
        .await
        .context("No Bluetooth adapter available")?;

    let snapshot =
        run_session_with_config(&transport, &target.address, &target.name, unit, session_config)
            .await
            .with_context(|| format!("Failed to read {} ({})", target.name, target.address))?;

    let content = match format {
        OutputFormat::Json => format_snapshot_json(&snapshot)?,
        OutputFormat::Text => format_snapshot_text(&snapshot),
    };

    write_output(output, &content)
}
