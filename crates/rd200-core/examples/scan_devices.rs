//! Example: Scanning for RD200 Monitors
//!
//! Lists every RD200 in range together with the protocol dialect its
//! advertised name selects.
//!
//! Run with: `cargo run --example scan_devices`

use rd200_core::scan::{self, ScanOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Scanning for RD200 monitors...");
    println!();

    let devices = scan::scan_for_devices(ScanOptions::default().duration_secs(10)).await?;

    if devices.is_empty() {
        println!("No RD200 monitors found.");
        println!();
        println!("Make sure:");
        println!("  - The monitor is powered on");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - No phone app is currently connected to it");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    println!();
    for device in &devices {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());

        println!("  {} [{}]", device.name, device.variant);
        println!("    Identifier: {}", device.identifier);
        println!("    RSSI: {}", rssi);
        println!();
    }

    Ok(())
}
