//! Output formatting utilities for text and JSON output.

use anyhow::Result;
use rd200_core::DiscoveredDevice;
use rd200_types::{DeviceSnapshot, Metric, MetricValue, ProtocolVariant};
use serde::Serialize;

/// Placeholder for metrics the device did not report.
pub const UNKNOWN: &str = "unknown";

/// A scan result in printable form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEntry {
    pub name: String,
    pub address: String,
    pub identifier: String,
    pub rssi: Option<i16>,
    pub variant: ProtocolVariant,
}

impl From<&DiscoveredDevice> for ScanEntry {
    fn from(device: &DiscoveredDevice) -> Self {
        Self {
            name: device.name.clone(),
            address: device.address.clone(),
            identifier: device.identifier.clone(),
            rssi: device.rssi,
            variant: device.variant,
        }
    }
}

// ============================================================================
// Scan formatting
// ============================================================================

pub fn format_scan_json(devices: &[ScanEntry]) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        devices: &'a [ScanEntry],
    }

    let result = ScanResult {
        count: devices.len(),
        devices,
    };
    Ok(serde_json::to_string_pretty(&result)? + "\n")
}

#[must_use]
pub fn format_scan_text(devices: &[ScanEntry]) -> String {
    if devices.is_empty() {
        return "No RD200 monitors found.\n".to_string();
    }

    let name_width = devices
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let id_width = devices
        .iter()
        .map(|d| d.identifier.len())
        .max()
        .unwrap_or(0)
        .max("IDENTIFIER".len());

    let mut output = format!(
        "{:<name_width$}  {:<id_width$}  {:<9}  {}\n",
        "NAME", "IDENTIFIER", "DIALECT", "RSSI"
    );
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        output.push_str(&format!(
            "{:<name_width$}  {:<id_width$}  {:<9}  {}\n",
            device.name,
            device.identifier,
            device.variant.to_string(),
            rssi
        ));
    }
    output.push_str(&format!("\nFound {} device(s)\n", devices.len()));
    output
}

// ============================================================================
// Snapshot formatting
// ============================================================================

/// Render a metric value with its unit, or `unknown` when absent.
#[must_use]
pub fn format_metric(snapshot: &DeviceSnapshot, metric: Metric) -> String {
    match snapshot.get(metric) {
        None => UNKNOWN.to_string(),
        Some(MetricValue::Number(n)) => match metric.unit(snapshot.unit) {
            Some(unit) if metric.is_concentration() => format!("{:.2} {}", n, unit),
            Some(unit) => format!("{} {}", n, unit),
            None => format!("{}", n),
        },
        Some(MetricValue::Text(s)) => s.clone(),
    }
}

#[must_use]
pub fn format_snapshot_text(snapshot: &DeviceSnapshot) -> String {
    let mut output = String::new();

    output.push_str(&format!("{} ({})\n", snapshot.name, snapshot.address));
    if let Some(variant) = snapshot.variant {
        output.push_str(&format!("  Dialect:  {}\n", variant));
    }
    if !snapshot.hw_version.is_empty() || !snapshot.sw_version.is_empty() {
        output.push_str(&format!(
            "  Firmware: hw {} / sw {}\n",
            or_unknown(&snapshot.hw_version),
            or_unknown(&snapshot.sw_version)
        ));
    }
    output.push('\n');

    let label_width = Metric::ALL
        .iter()
        .map(|m| m.label().len())
        .max()
        .unwrap_or(0);
    for metric in Metric::ALL {
        output.push_str(&format!(
            "  {:<label_width$}  {}\n",
            metric.label(),
            format_metric(snapshot, metric)
        ));
    }
    output
}

pub fn format_snapshot_json(snapshot: &DeviceSnapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)? + "\n")
}

// ============================================================================
// Watch formatting
// ============================================================================

/// One line per poll: capture time, then the concentration metrics.
#[must_use]
pub fn format_watch_line(snapshot: &DeviceSnapshot) -> String {
    let ts = snapshot
        .captured_at
        .map(|t| format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second()))
        .unwrap_or_else(|| "--:--:--".to_string());

    let parts: Vec<String> = [
        ("Radon", Metric::Radon),
        ("1d", Metric::Radon1DayLevel),
        ("1m", Metric::Radon1MonthLevel),
        ("Peak", Metric::RadonPeak),
    ]
    .into_iter()
    .map(|(label, metric)| format!("{} {}", label, format_metric(snapshot, metric)))
    .collect();

    format!("[{}]  {}\n", ts, parts.join("  "))
}

/// A snapshot as a single JSON line.
pub fn format_watch_json(snapshot: &DeviceSnapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)? + "\n")
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() { UNKNOWN } else { s }
}
