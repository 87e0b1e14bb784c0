//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use rd200_core::scan::{self, ScanOptions};

use crate::cli::DeviceArgs;
use crate::config::{Config, resolve_device, resolve_name};
use crate::format::ScanEntry;

/// The monitor a command talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Address or peripheral ID to connect with.
    pub address: String,
    /// Advertised name, which selects the protocol dialect.
    pub name: String,
}

/// Work out which monitor to talk to.
///
/// When both the address and the advertised name are known no scan is run.
/// Otherwise a scan supplies the missing half; with no device given at all,
/// the only monitor in range is used.
pub async fn resolve_target(args: &DeviceArgs, config: &Config) -> Result<Target> {
    let device = resolve_device(args.device.clone(), config);
    let name = resolve_name(args.name.clone(), device.as_deref(), config);

    if let (Some(address), Some(name)) = (&device, &name) {
        return Ok(Target {
            address: address.clone(),
            name: name.clone(),
        });
    }

    tracing::info!("Scanning {}s to look up the monitor", args.scan_timeout);
    let devices = scan::scan_for_devices(ScanOptions::default().duration_secs(args.scan_timeout))
        .await
        .context("Failed to scan for devices")?;
    let entries: Vec<ScanEntry> = devices.iter().map(ScanEntry::from).collect();

    select_target(&entries, device.as_deref())
}

/// Pick the target from scan results.
pub fn select_target(entries: &[ScanEntry], device: Option<&str>) -> Result<Target> {
    let target = |entry: &ScanEntry| Target {
        address: entry.identifier.clone(),
        name: entry.name.clone(),
    };

    if let Some(wanted) = device {
        return entries
            .iter()
            .find(|e| {
                e.identifier.eq_ignore_ascii_case(wanted)
                    || e.address.eq_ignore_ascii_case(wanted)
                    || e.name == wanted
            })
            .map(target)
            .with_context(|| {
                format!(
                    "Device {} not found nearby.\n\
                     Make sure it is powered on and in range, or pass --name to skip the scan.",
                    wanted
                )
            });
    }

    match entries {
        [] => bail!(
            "No RD200 monitors found nearby.\n\
             Make sure your monitor is powered on and in range."
        ),
        [only] => {
            tracing::info!("Using {} ({})", only.name, only.identifier);
            Ok(target(only))
        }
        several => {
            let list: Vec<String> = several
                .iter()
                .map(|e| format!("  {} ({})", e.name, e.identifier))
                .collect();
            bail!(
                "Found {} monitors, choose one with --device:\n{}",
                several.len(),
                list.join("\n")
            )
        }
    }
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Append output to file or write it to stdout.
pub fn append_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            Ok(())
        }
        None => write_output(None, content),
    }
}
