//! Example: Reading a Snapshot
//!
//! Runs one session against a monitor and prints every metric, marking the
//! ones the device did not report this time as unknown.
//!
//! Run with: `cargo run --example read_snapshot -- <address> <advertised name>`

use std::env;

use rd200_core::{BleTransport, Metric, RadonUnit, run_session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let (Some(address), Some(name)) = (args.next(), args.next()) else {
        eprintln!("Usage: read_snapshot <address> <advertised name>");
        std::process::exit(2);
    };

    let transport = BleTransport::new().await?;
    let snapshot = run_session(&transport, &address, &name, RadonUnit::BqPerM3).await?;

    println!("{} ({})", snapshot.name, snapshot.address);
    if !snapshot.hw_version.is_empty() || !snapshot.sw_version.is_empty() {
        println!("  Firmware: {} / {}", snapshot.hw_version, snapshot.sw_version);
    }
    for metric in Metric::ALL {
        let value = snapshot
            .get(metric)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let unit = metric.unit(snapshot.unit).unwrap_or("");
        println!("  {:<22} {} {}", metric.label(), value, unit);
    }

    Ok(())
}
