//! Scan command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rd200_core::scan::{self, ScanOptions};

use crate::cli::OutputFormat;
use crate::format::{ScanEntry, format_scan_json, format_scan_text};
use crate::util::write_output;

pub async fn cmd_scan(
    timeout: u64,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
) -> Result<()> {
    if !quiet && matches!(format, OutputFormat::Text) {
        eprintln!("Scanning for RD200 monitors ({}s)...", timeout);
    }

    let devices = scan::scan_for_devices(ScanOptions::default().duration_secs(timeout))
        .await
        .context("Failed to scan for devices")?;
    let entries: Vec<ScanEntry> = devices.iter().map(ScanEntry::from).collect();

    let content = match format {
        OutputFormat::Json => format_scan_json(&entries)?,
        OutputFormat::Text => format_scan_text(&entries),
    };

    write_output(output, &content)
}
